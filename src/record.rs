//! Incident records and the categorical attributes the dashboard filters on.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Token substituted for every missing categorical value at load time.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_id: usize,
    pub shark_type: String,
    pub shark_full_name: String,
    pub injury_result: String,
    pub injury_severity: String,
    pub state: String,
    pub location_type: String,
    pub victim_gender: String,
    pub data_source: String,
    pub victim_activity: String,
    pub provoked: String,
    pub shark_length_m: Option<f64>,
    pub incident_year: i32,
    pub incident_month: u32,
    pub incident_date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
}

impl Record {
    /// Value of a categorical attribute, as used for filtering and grouping.
    pub fn category(&self, attribute: Attribute) -> Cow<'_, str> {
        match attribute {
            Attribute::SharkType => Cow::Borrowed(&self.shark_type),
            Attribute::InjuryResult => Cow::Borrowed(&self.injury_result),
            Attribute::InjurySeverity => Cow::Borrowed(&self.injury_severity),
            Attribute::State => Cow::Borrowed(&self.state),
            Attribute::LocationType => Cow::Borrowed(&self.location_type),
            Attribute::VictimGender => Cow::Borrowed(&self.victim_gender),
            Attribute::DataSource => Cow::Borrowed(&self.data_source),
            Attribute::VictimActivity => Cow::Borrowed(&self.victim_activity),
            Attribute::Provoked => Cow::Borrowed(&self.provoked),
            Attribute::IncidentMonth => Cow::Owned(self.incident_month.to_string()),
        }
    }

    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// Categorical attribute identifiers. Charts and filters refer to attributes
/// only through this enum; display labels live in [`Attribute::label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    SharkType,
    InjuryResult,
    InjurySeverity,
    State,
    LocationType,
    VictimGender,
    DataSource,
    VictimActivity,
    Provoked,
    IncidentMonth,
}

impl Attribute {
    pub const ALL: [Attribute; 10] = [
        Attribute::SharkType,
        Attribute::InjuryResult,
        Attribute::InjurySeverity,
        Attribute::State,
        Attribute::LocationType,
        Attribute::VictimGender,
        Attribute::DataSource,
        Attribute::VictimActivity,
        Attribute::Provoked,
        Attribute::IncidentMonth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::SharkType => "shark_type",
            Attribute::InjuryResult => "injury_result",
            Attribute::InjurySeverity => "injury_severity",
            Attribute::State => "state",
            Attribute::LocationType => "location_type",
            Attribute::VictimGender => "victim_gender",
            Attribute::DataSource => "data_source",
            Attribute::VictimActivity => "victim_activity",
            Attribute::Provoked => "provoked",
            Attribute::IncidentMonth => "incident_month",
        }
    }

    /// Whether the filter criteria carry a set for this attribute. The month
    /// is chartable but filtered only through the year range.
    pub fn is_filterable(&self) -> bool {
        !matches!(self, Attribute::IncidentMonth)
    }

    /// Column header in the source table.
    pub fn column(&self) -> &'static str {
        match self {
            Attribute::SharkType => "Shark.common.name",
            Attribute::InjuryResult => "Victim.injury",
            Attribute::InjurySeverity => "Injury.severity",
            Attribute::State => "State",
            Attribute::LocationType => "Site.category",
            Attribute::VictimGender => "Victim.gender",
            Attribute::DataSource => "Data.source",
            Attribute::VictimActivity => "Victim.activity",
            Attribute::Provoked => "Provoked/unprovoked",
            Attribute::IncidentMonth => "Incident.month",
        }
    }

    /// Human-readable label shown on chart axes and legends.
    pub fn label(&self) -> &'static str {
        match self {
            Attribute::SharkType => "Shark Type",
            Attribute::InjuryResult => "Victim Injury Result",
            Attribute::InjurySeverity => "Victim Injury Severity",
            Attribute::State => "State",
            Attribute::LocationType => "Location Type",
            Attribute::VictimGender => "Victim Gender",
            Attribute::DataSource => "Source Type",
            Attribute::VictimActivity => "Victim Activity",
            Attribute::Provoked => "Provoked",
            Attribute::IncidentMonth => "Incident Month",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = String;

    /// Accepts either the snake_case identifier or the source column name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Attribute::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s || a.column() == s)
            .ok_or_else(|| format!("unknown attribute: {}", s))
    }
}

/// Collapse spelling variants of the injury outcome to one token.
pub fn canonical_injury_result(raw: &str) -> &str {
    match raw {
        "injured" | "injury" | "Injured" => "injured",
        other => other,
    }
}

/// Collapse spelling variants of the injury severity to one token.
pub fn canonical_injury_severity(raw: &str) -> &str {
    match raw {
        "fatal" | "fatality" => "fatal",
        other => other,
    }
}

/// First day of the given month. `None` when the month is outside 1..=12.
pub fn incident_date(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}
