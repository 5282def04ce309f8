//! Filter pipeline: independent predicates over the record store, combined
//! by conjunction. Predicates commute, so evaluation order is free.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::data::RecordStore;
use crate::error::{DashboardError, Result};
use crate::logging::{log_filter_applied, params_hash};
use crate::record::{Attribute, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        self.min <= year && year <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LengthRange {
    pub min: f64,
    pub max: f64,
}

impl LengthRange {
    pub fn contains(&self, len: f64) -> bool {
        self.min <= len && len <= self.max
    }
}

/// Full set of filter parameters for one pipeline run. An empty set means no
/// constraint on that attribute; both ranges are always applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(default)]
    pub shark_types: BTreeSet<String>,
    #[serde(default)]
    pub injury_results: BTreeSet<String>,
    #[serde(default)]
    pub injury_severities: BTreeSet<String>,
    #[serde(default)]
    pub states: BTreeSet<String>,
    #[serde(default)]
    pub location_types: BTreeSet<String>,
    #[serde(default)]
    pub victim_genders: BTreeSet<String>,
    #[serde(default)]
    pub data_sources: BTreeSet<String>,
    #[serde(default)]
    pub victim_activities: BTreeSet<String>,
    #[serde(default)]
    pub provoked_statuses: BTreeSet<String>,
    pub shark_length_range: LengthRange,
    #[serde(default = "default_include_unknown")]
    pub include_unknown_length: bool,
    pub year_range: YearRange,
}

fn default_include_unknown() -> bool {
    true
}

impl Criteria {
    /// Criteria that keep every record: no categorical constraint, the full
    /// observed ranges, and unknown lengths included. This is the state the
    /// dashboard returns to on "reset filters".
    pub fn unfiltered(store: &RecordStore) -> Self {
        let length = store
            .length_extent()
            .unwrap_or(LengthRange { min: 0.0, max: 0.0 });
        Self {
            shark_types: BTreeSet::new(),
            injury_results: BTreeSet::new(),
            injury_severities: BTreeSet::new(),
            states: BTreeSet::new(),
            location_types: BTreeSet::new(),
            victim_genders: BTreeSet::new(),
            data_sources: BTreeSet::new(),
            victim_activities: BTreeSet::new(),
            provoked_statuses: BTreeSet::new(),
            shark_length_range: length,
            include_unknown_length: true,
            year_range: store.year_extent(),
        }
    }

    /// Categorical constraints paired with the attribute each one tests.
    pub fn categorical(&self) -> [(Attribute, &BTreeSet<String>); 9] {
        [
            (Attribute::SharkType, &self.shark_types),
            (Attribute::InjuryResult, &self.injury_results),
            (Attribute::InjurySeverity, &self.injury_severities),
            (Attribute::State, &self.states),
            (Attribute::LocationType, &self.location_types),
            (Attribute::VictimGender, &self.victim_genders),
            (Attribute::DataSource, &self.data_sources),
            (Attribute::VictimActivity, &self.victim_activities),
            (Attribute::Provoked, &self.provoked_statuses),
        ]
    }

    /// Mutable access to the set constraining `attribute`, if it is filterable.
    pub fn set_mut(&mut self, attribute: Attribute) -> Option<&mut BTreeSet<String>> {
        match attribute {
            Attribute::SharkType => Some(&mut self.shark_types),
            Attribute::InjuryResult => Some(&mut self.injury_results),
            Attribute::InjurySeverity => Some(&mut self.injury_severities),
            Attribute::State => Some(&mut self.states),
            Attribute::LocationType => Some(&mut self.location_types),
            Attribute::VictimGender => Some(&mut self.victim_genders),
            Attribute::DataSource => Some(&mut self.data_sources),
            Attribute::VictimActivity => Some(&mut self.victim_activities),
            Attribute::Provoked => Some(&mut self.provoked_statuses),
            Attribute::IncidentMonth => None,
        }
    }

    /// Number of predicates that can reject a record.
    pub fn active_predicates(&self) -> usize {
        // both ranges are always active
        2 + self.categorical().iter().filter(|(_, s)| !s.is_empty()).count()
    }

    pub fn validate(&self) -> Result<()> {
        let len = self.shark_length_range;
        // NaN bounds fail the comparison and are rejected with min > max.
        if !(len.min <= len.max) {
            return Err(DashboardError::InvalidRange {
                field: "shark_length",
                min: len.min.to_string(),
                max: len.max.to_string(),
            });
        }
        let years = self.year_range;
        if years.min > years.max {
            return Err(DashboardError::InvalidRange {
                field: "year",
                min: years.min.to_string(),
                max: years.max.to_string(),
            });
        }
        Ok(())
    }

    pub fn matches(&self, record: &Record) -> bool {
        if !self.year_range.contains(record.incident_year) {
            return false;
        }
        let length_ok = match record.shark_length_m {
            Some(len) => self.shark_length_range.contains(len),
            None => self.include_unknown_length,
        };
        if !length_ok {
            return false;
        }
        self.categorical()
            .iter()
            .all(|(attr, set)| set.is_empty() || set.contains(&*record.category(*attr)))
    }

    /// Stable hash of the criteria, used to correlate log lines.
    pub fn fingerprint(&self) -> String {
        params_hash(&serde_json::to_string(self).unwrap_or_default())
    }
}

/// An ordered subset of records. Holds borrowed records in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct View<'a> {
    records: Vec<&'a Record>,
}

impl<'a> View<'a> {
    pub fn new(records: Vec<&'a Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[&'a Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Record> + '_ {
        self.records.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.record_id).collect()
    }
}

impl<'a> FromIterator<&'a Record> for View<'a> {
    fn from_iter<I: IntoIterator<Item = &'a Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Keep the records that satisfy every active predicate, in input order.
pub fn apply<'a>(records: &'a [Record], criteria: &Criteria) -> Result<View<'a>> {
    criteria.validate()?;
    let view: View<'a> = records.iter().filter(|r| criteria.matches(r)).collect();
    log_filter_applied(
        &criteria.fingerprint(),
        records.len(),
        view.len(),
        criteria.active_predicates(),
    );
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{incident_date, UNKNOWN};

    fn rec(id: usize, shark: &str, length: Option<f64>, year: i32) -> Record {
        Record {
            record_id: id,
            shark_type: shark.into(),
            shark_full_name: UNKNOWN.into(),
            injury_result: "injured".into(),
            injury_severity: "minor".into(),
            state: "NSW".into(),
            location_type: "coastal".into(),
            victim_gender: "male".into(),
            data_source: "media".into(),
            victim_activity: "swimming".into(),
            provoked: "unprovoked".into(),
            shark_length_m: length,
            incident_year: year,
            incident_month: 1,
            incident_date: incident_date(year, 1).unwrap(),
            latitude: -33.0,
            longitude: 151.0,
        }
    }

    fn open(records: &[Record]) -> Criteria {
        let store = RecordStore::from_records(records.to_vec()).unwrap();
        Criteria::unfiltered(&store)
    }

    #[test]
    fn test_unknown_length_inclusion() {
        let records = vec![
            rec(0, "white shark", None, 2000),
            rec(1, "white shark", Some(0.5), 2000),
            rec(2, "white shark", Some(1.5), 2000),
        ];
        let mut c = open(&records);
        c.shark_length_range = LengthRange { min: 1.0, max: 2.0 };

        c.include_unknown_length = true;
        assert_eq!(apply(&records, &c).unwrap().ids(), vec![0, 2]);

        c.include_unknown_length = false;
        assert_eq!(apply(&records, &c).unwrap().ids(), vec![2]);
    }

    #[test]
    fn test_inverted_ranges_rejected() {
        let records = vec![rec(0, "white shark", Some(1.0), 2000)];
        let mut c = open(&records);
        c.shark_length_range = LengthRange { min: 3.0, max: 1.0 };
        assert!(matches!(
            apply(&records, &c),
            Err(DashboardError::InvalidRange { field: "shark_length", .. })
        ));

        let mut c = open(&records);
        c.year_range = YearRange { min: 2010, max: 1990 };
        assert!(matches!(
            apply(&records, &c),
            Err(DashboardError::InvalidRange { field: "year", .. })
        ));
    }

    #[test]
    fn test_nan_length_bound_rejected() {
        let records = vec![rec(0, "white shark", Some(1.0), 2000)];
        let mut c = open(&records);
        c.shark_length_range = LengthRange { min: f64::NAN, max: 2.0 };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_year_range_inclusive() {
        let records = vec![
            rec(0, "a", Some(1.0), 1990),
            rec(1, "a", Some(1.0), 2000),
            rec(2, "a", Some(1.0), 2010),
        ];
        let mut c = open(&records);
        c.year_range = YearRange { min: 1990, max: 2000 };
        assert_eq!(apply(&records, &c).unwrap().ids(), vec![0, 1]);
    }

    #[test]
    fn test_unmatched_category_is_empty_not_error() {
        let records = vec![rec(0, "white shark", Some(1.0), 2000)];
        let mut c = open(&records);
        c.shark_types.insert("megalodon".into());
        let view = apply(&records, &c).unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn test_active_predicates_counts_nonempty_sets() {
        let records = vec![rec(0, "white shark", Some(1.0), 2000)];
        let mut c = open(&records);
        assert_eq!(c.active_predicates(), 2);
        c.states.insert("NSW".into());
        c.set_mut(Attribute::Provoked).unwrap().insert("provoked".into());
        assert_eq!(c.active_predicates(), 4);
        assert!(c.set_mut(Attribute::IncidentMonth).is_none());
    }

    #[test]
    fn test_criteria_json_defaults() {
        let c: Criteria = serde_json::from_str(
            r#"{"shark_length_range":{"min":0.5,"max":7.0},"year_range":{"min":1900,"max":2020},"states":["WA"]}"#,
        )
        .unwrap();
        assert!(c.include_unknown_length);
        assert!(c.shark_types.is_empty());
        assert!(c.states.contains("WA"));
    }
}
