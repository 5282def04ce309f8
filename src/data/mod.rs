//! Record store: reads the incident table once, normalizes it, and hands out
//! shared read-only access for the lifetime of the process.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{DashboardError, Result};
use crate::filter::{LengthRange, YearRange};
use crate::logging::{log, log_dataset_loaded, obj, v_str, Domain, Level};
use crate::record::{
    canonical_injury_result, canonical_injury_severity, incident_date, Attribute, Record, UNKNOWN,
};

pub const REQUIRED_COLUMNS: [&str; 14] = [
    "Shark.common.name",
    "Victim.injury",
    "Injury.severity",
    "State",
    "Site.category",
    "Victim.gender",
    "Data.source",
    "Victim.activity",
    "Provoked/unprovoked",
    "Shark.length.m",
    "Incident.year",
    "Incident.month",
    "Latitude",
    "Longitude",
];

pub const OPTIONAL_COLUMNS: [&str; 1] = ["Shark.full.name"];

/// One source row before normalization. Every cell is optional here; the
/// required-column check happens on the header.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawRow {
    #[serde(rename = "Shark.common.name", default)]
    shark_type: Option<String>,
    #[serde(rename = "Shark.full.name", default)]
    shark_full_name: Option<String>,
    #[serde(rename = "Victim.injury", default)]
    injury_result: Option<String>,
    #[serde(rename = "Injury.severity", default)]
    injury_severity: Option<String>,
    #[serde(rename = "State", default)]
    state: Option<String>,
    #[serde(rename = "Site.category", default)]
    location_type: Option<String>,
    #[serde(rename = "Victim.gender", default)]
    victim_gender: Option<String>,
    #[serde(rename = "Data.source", default)]
    data_source: Option<String>,
    #[serde(rename = "Victim.activity", default)]
    victim_activity: Option<String>,
    #[serde(rename = "Provoked/unprovoked", default)]
    provoked: Option<String>,
    #[serde(rename = "Shark.length.m", default)]
    shark_length_m: Option<String>,
    #[serde(rename = "Incident.year", default)]
    incident_year: Option<String>,
    #[serde(rename = "Incident.month", default)]
    incident_month: Option<String>,
    #[serde(rename = "Latitude", default)]
    latitude: Option<String>,
    #[serde(rename = "Longitude", default)]
    longitude: Option<String>,
}

/// What normalization changed while loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub rows: usize,
    /// Missing categorical cells replaced by the sentinel, per column.
    pub unknown_filled: BTreeMap<String, u64>,
    /// Cells rewritten to a canonical token, per column.
    pub canonicalized: BTreeMap<String, u64>,
    pub unknown_length_rows: usize,
}

impl LoadReport {
    pub fn total_filled(&self) -> u64 {
        self.unknown_filled.values().sum()
    }

    pub fn total_canonicalized(&self) -> u64 {
        self.canonicalized.values().sum()
    }

    fn fill(&mut self, column: &str, raw: Option<String>) -> String {
        match present(raw) {
            Some(v) => v,
            None => {
                *self.unknown_filled.entry(column.to_string()).or_insert(0) += 1;
                UNKNOWN.to_string()
            }
        }
    }

    fn canonicalize(&mut self, column: &str, value: String, f: fn(&str) -> &str) -> String {
        let canonical = f(&value);
        if canonical == value {
            return value;
        }
        *self.canonicalized.entry(column.to_string()).or_insert(0) += 1;
        canonical.to_string()
    }
}

/// Immutable, cheaply cloneable handle to the loaded incident table.
#[derive(Debug, Clone)]
pub struct RecordStore {
    records: Arc<[Record]>,
    report: Arc<LoadReport>,
}

impl RecordStore {
    /// Read and normalize the table at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| DashboardError::DataLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_reader(file)
    }

    /// Read and normalize a CSV table from any reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(false)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = rdr.headers()?.clone();

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| !headers.iter().any(|h| h == **c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DashboardError::MissingColumns(missing));
        }

        let mut report = LoadReport::default();
        let mut records = Vec::new();
        for row in rdr.records() {
            let row = row?;
            let line = row.position().map(|p| p.line()).unwrap_or(0);
            let raw: RawRow = row.deserialize(Some(&headers))?;
            let record = normalize(records.len(), raw, &mut report)
                .map_err(|reason| DashboardError::MalformedRow { line, reason })?;
            records.push(record);
        }

        Self::finish(records, report)
    }

    /// Build a store from already-shaped records. Identifiers are reassigned
    /// from position and categorical cells are normalized like a file load.
    pub fn from_records(records: Vec<Record>) -> Result<Self> {
        let mut report = LoadReport::default();
        let records = records
            .into_iter()
            .enumerate()
            .map(|(idx, mut r)| {
                use Attribute::*;
                r.record_id = idx;
                r.shark_type = report.fill(SharkType.column(), Some(r.shark_type));
                r.shark_full_name = report.fill("Shark.full.name", Some(r.shark_full_name));
                let injury = report.fill(InjuryResult.column(), Some(r.injury_result));
                r.injury_result =
                    report.canonicalize(InjuryResult.column(), injury, canonical_injury_result);
                let severity = report.fill(InjurySeverity.column(), Some(r.injury_severity));
                r.injury_severity = report.canonicalize(
                    InjurySeverity.column(),
                    severity,
                    canonical_injury_severity,
                );
                r.state = report.fill(State.column(), Some(r.state));
                r.location_type = report.fill(LocationType.column(), Some(r.location_type));
                r.victim_gender = report.fill(VictimGender.column(), Some(r.victim_gender));
                r.data_source = report.fill(DataSource.column(), Some(r.data_source));
                r.victim_activity = report.fill(VictimActivity.column(), Some(r.victim_activity));
                r.provoked = report.fill(Provoked.column(), Some(r.provoked));
                if r.shark_length_m.is_none() {
                    report.unknown_length_rows += 1;
                }
                r
            })
            .collect();
        Self::finish(records, report)
    }

    fn finish(records: Vec<Record>, mut report: LoadReport) -> Result<Self> {
        if records.is_empty() {
            return Err(DashboardError::EmptyDataset);
        }
        report.rows = records.len();
        Ok(Self {
            records: records.into(),
            report: Arc::new(report),
        })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, record_id: usize) -> Option<&Record> {
        self.records.get(record_id)
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// Smallest and largest incident year in the table.
    pub fn year_extent(&self) -> YearRange {
        let mut years = self.records.iter().map(|r| r.incident_year);
        let first = years.next().unwrap_or(0);
        let (min, max) = years.fold((first, first), |(lo, hi), y| (lo.min(y), hi.max(y)));
        YearRange { min, max }
    }

    /// Smallest and largest known shark length. `None` when no row has a length.
    pub fn length_extent(&self) -> Option<LengthRange> {
        self.records
            .iter()
            .filter_map(|r| r.shark_length_m)
            .fold(None, |acc: Option<LengthRange>, len| {
                Some(match acc {
                    None => LengthRange { min: len, max: len },
                    Some(r) => LengthRange {
                        min: r.min.min(len),
                        max: r.max.max(len),
                    },
                })
            })
    }

    /// Distinct values of an attribute in first-occurrence order.
    pub fn distinct_values(&self, attribute: Attribute) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for r in self.records.iter() {
            let v = r.category(attribute);
            if !seen.contains(&*v) {
                seen.insert(v.to_string());
                out.push(v.into_owned());
            }
        }
        out
    }
}

fn present(raw: Option<String>) -> Option<String> {
    let v = raw?;
    let t = v.trim();
    if t.is_empty() || t.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(t.to_string())
    }
}

fn parse_int<T: std::str::FromStr>(
    column: &str,
    raw: Option<String>,
) -> std::result::Result<T, String> {
    let v = present(raw).ok_or_else(|| format!("missing {}", column))?;
    v.replace(',', "")
        .parse::<T>()
        .map_err(|_| format!("bad {}: {}", column, v))
}

fn parse_float(column: &str, raw: Option<String>) -> std::result::Result<Option<f64>, String> {
    match present(raw) {
        None => Ok(None),
        Some(v) => v
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Some)
            .ok_or_else(|| format!("bad {}: {}", column, v)),
    }
}

fn normalize(
    record_id: usize,
    raw: RawRow,
    report: &mut LoadReport,
) -> std::result::Result<Record, String> {
    let incident_year: i32 = parse_int("Incident.year", raw.incident_year)?;
    let incident_month: u32 = parse_int("Incident.month", raw.incident_month)?;
    let incident_date = incident_date(incident_year, incident_month)
        .ok_or_else(|| format!("bad Incident.month: {}", incident_month))?;
    let latitude = parse_float("Latitude", raw.latitude)?.ok_or("missing Latitude")?;
    let longitude = parse_float("Longitude", raw.longitude)?.ok_or("missing Longitude")?;
    let shark_length_m = parse_float("Shark.length.m", raw.shark_length_m)?;
    if shark_length_m.is_none() {
        report.unknown_length_rows += 1;
    }

    let injury = report.fill("Victim.injury", raw.injury_result);
    let severity = report.fill("Injury.severity", raw.injury_severity);

    Ok(Record {
        record_id,
        shark_type: report.fill("Shark.common.name", raw.shark_type),
        shark_full_name: report.fill("Shark.full.name", raw.shark_full_name),
        injury_result: report.canonicalize("Victim.injury", injury, canonical_injury_result),
        injury_severity: report.canonicalize(
            "Injury.severity",
            severity,
            canonical_injury_severity,
        ),
        state: report.fill("State", raw.state),
        location_type: report.fill("Site.category", raw.location_type),
        victim_gender: report.fill("Victim.gender", raw.victim_gender),
        data_source: report.fill("Data.source", raw.data_source),
        victim_activity: report.fill("Victim.activity", raw.victim_activity),
        provoked: report.fill("Provoked/unprovoked", raw.provoked),
        shark_length_m,
        incident_year,
        incident_month,
        incident_date,
        latitude,
        longitude,
    })
}

// =============================================================================
// Schema check and manifest
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaReport {
    pub columns: Vec<String>,
    pub missing: Vec<String>,
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub path: String,
    pub hash_sha256: String,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub year_range: YearRange,
    pub length_range: Option<LengthRange>,
    pub load: LoadReport,
    pub generated_at_epoch: u64,
}

pub fn read_header(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| DashboardError::DataLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    Ok(rdr.headers()?.iter().map(|s| s.to_string()).collect())
}

pub fn validate_schema(path: &Path) -> Result<SchemaReport> {
    let columns = read_header(path)?;
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !columns.iter().any(|h| h == *c))
        .map(|c| c.to_string())
        .collect();
    let ok = missing.is_empty();
    let message = if ok {
        "schema ok".to_string()
    } else {
        format!("schema mismatch: missing {:?}", missing)
    };
    Ok(SchemaReport {
        columns,
        missing,
        ok,
        message,
    })
}

/// Load the table at `path` and describe it.
pub fn analyze_csv(path: &Path, now_ts: u64) -> Result<(RecordStore, DatasetManifest)> {
    let hash = file_sha256(path)?;
    let columns = read_header(path)?;
    let store = RecordStore::load(path)?;
    let manifest = DatasetManifest {
        path: path.display().to_string(),
        hash_sha256: hash,
        row_count: store.len(),
        columns,
        year_range: store.year_extent(),
        length_range: store.length_extent(),
        load: store.report().clone(),
        generated_at_epoch: now_ts,
    };
    Ok((store, manifest))
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| DashboardError::DataLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Log a completed load, hash included. When the file can no longer be read
/// for hashing the load is still logged, with a warning and an empty hash.
pub fn log_store_loaded(path: &Path, store: &RecordStore) -> Option<String> {
    let hash = match file_sha256(path) {
        Ok(hash) => Some(hash),
        Err(err) => {
            log(
                Level::Warn,
                Domain::Data,
                "dataset_hash_failed",
                obj(&[
                    ("path", v_str(&path.display().to_string())),
                    ("error", v_str(&err.to_string())),
                ]),
            );
            None
        }
    };
    let report = store.report();
    log_dataset_loaded(
        &path.display().to_string(),
        store.len(),
        hash.as_deref().unwrap_or_default(),
        report.total_filled(),
        report.total_canonicalized(),
    );
    hash
}

pub fn default_manifest_path(path: &Path) -> PathBuf {
    let mut out = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset".to_string());
    out.set_file_name(format!("{}.manifest.json", file_name));
    out
}
