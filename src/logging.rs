//! Structured JSON-lines logging for the dashboard core.
//!
//! Every entry carries a run id, a sequence number and a domain so that a
//! single request can be followed from criteria to aggregates. Entries are
//! written to `<LOG_DIR>/<run_id>/events.jsonl` (trace/debug go to
//! `trace.jsonl`) and mirrored to stderr, keeping stdout free for CLI output.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// --- log levels ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    /// Threshold from `LOG_LEVEL`, defaulting to info.
    pub fn from_env() -> Self {
        std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Level::Info)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Level::Trace,
            Level::Debug,
            Level::Info,
            Level::Warn,
            Level::Error,
            Level::Fatal,
        ]
        .into_iter()
        .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| format!("unknown log level: {}", s))
    }
}

// --- log domains (categories for filtering) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Data,      // Table load, normalization, manifest
    Filter,    // Criteria evaluation
    Selection, // Map selection refinement
    Aggregate, // Counts, cross-tabs, timeline
    Server,    // Request handling
    System,    // Startup, shutdown
    Profile,   // Timing
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Data => "data",
            Domain::Filter => "filter",
            Domain::Selection => "selection",
            Domain::Aggregate => "aggregate",
            Domain::Server => "server",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    /// `LOG_DOMAINS` is a comma-separated list of domain names, or `all`.
    pub fn is_enabled(&self) -> bool {
        let Ok(list) = std::env::var("LOG_DOMAINS") else {
            return true;
        };
        list.split(',')
            .map(str::trim)
            .any(|d| d == "all" || d == self.as_str())
    }
}

// --- run context ---

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn open_sink(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_sink(run_dir.join("events.jsonl")),
            trace: open_sink(run_dir.join("trace.jsonl")),
            run_id,
        }
    })
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["request_id", "criteria_hash", "attribute", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(Ok(mut w)) = writer.as_ref().map(|m| m.lock()) {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// --- core logging functions ---

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit one entry if `level` clears the threshold and `domain` is enabled.
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level >= Level::from_env() && domain.is_enabled() {
        emit_record(level, domain.as_str(), event, fields);
    }
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let (mut top, data) = split_fields(fields);

    let mut entry = json!({
        "ts": ts_now(),
        "run_id": ctx.run_id,
        "seq": next_seq(),
        "lvl": level.as_str().to_uppercase(),
        "component": component,
        "event": event,
        "msg": top.remove("msg").unwrap_or_else(|| v_str("")),
    });
    if let Value::Object(map) = &mut entry {
        map.extend(top);
        map.insert("data".into(), Value::Object(data));
    }

    let line = entry.to_string();
    let sink = if level <= Level::Debug { &ctx.trace } else { &ctx.events };
    write_line(sink, &line);
    eprintln!("{}", line);
}

// --- domain logs ---

/// Record a completed table load.
pub fn log_dataset_loaded(path: &str, rows: usize, sha256: &str, filled: u64, canonicalized: u64) {
    log(
        Level::Info,
        Domain::Data,
        "dataset_loaded",
        obj(&[
            ("path", v_str(path)),
            ("rows", json!(rows)),
            ("sha256", v_str(sha256)),
            ("unknown_filled", json!(filled)),
            ("canonicalized", json!(canonicalized)),
        ]),
    );
}

/// Record how a criteria set narrowed the table.
pub fn log_filter_applied(criteria_hash: &str, input: usize, kept: usize, active: usize) {
    log(
        Level::Debug,
        Domain::Filter,
        "filter_applied",
        obj(&[
            ("criteria_hash", v_str(criteria_hash)),
            ("input", json!(input)),
            ("kept", json!(kept)),
            ("active_predicates", json!(active)),
        ]),
    );
}

/// Record a map selection refinement.
pub fn log_selection(points: usize, filtered: usize, selected: usize, explicit: bool) {
    log(
        Level::Debug,
        Domain::Selection,
        "selection_derived",
        obj(&[
            ("points", json!(points)),
            ("filtered", json!(filtered)),
            ("selected", json!(selected)),
            ("explicit", Value::Bool(explicit)),
        ]),
    );
}

/// Record a request rejected before any aggregate was produced.
pub fn log_request_rejected(request_id: u64, reason: &str) {
    log(
        Level::Warn,
        Domain::Server,
        "request_rejected",
        obj(&[
            ("request_id", json!(request_id)),
            ("reason", v_str(reason)),
        ]),
    );
}

// --- utility functions ---

pub fn params_hash(input: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut h);
    format!("{:x}", h.finish())
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// --- profiling scope ---

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
    enabled: bool,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            context: None,
            started: Instant::now(),
            enabled: Self::should_sample(),
        }
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        let enabled = Self::should_sample();
        Self {
            label,
            context: if enabled { Some(obj(fields)) } else { None },
            started: Instant::now(),
            enabled,
        }
    }

    /// `PROFILE_SAMPLE` in [0, 1]; unset or unparsable samples everything.
    fn should_sample() -> bool {
        let rate = match std::env::var("PROFILE_SAMPLE").map(|v| v.parse::<f64>()) {
            Ok(Ok(p)) => p,
            _ => return true,
        };
        match rate {
            p if p >= 1.0 => true,
            p if p <= 0.0 => false,
            p => {
                let n = PROFILE_SEQ.fetch_add(1, Ordering::Relaxed) % 1_000;
                (n as f64) < p * 1_000.0
            }
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// --- tests ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse_and_order() {
        assert_eq!("WARN".parse::<Level>(), Ok(Level::Warn));
        assert_eq!(" trace ".parse::<Level>(), Ok(Level::Trace));
        assert!("loud".parse::<Level>().is_err());
        assert!(Level::Debug < Level::Info && Level::Error < Level::Fatal);
    }

    #[test]
    fn test_params_hash_separates_inputs() {
        assert_eq!(params_hash("states=WA"), params_hash("states=WA"));
        assert_ne!(params_hash("states=WA"), params_hash("states=SA"));
    }

    #[test]
    fn test_split_fields_lifts_correlation_keys() {
        let fields = obj(&[
            ("request_id", json!(7)),
            ("msg", v_str("hello")),
            ("rows", json!(3)),
        ]);
        let (top, data) = split_fields(fields);
        assert_eq!(top.get("request_id").unwrap(), 7);
        assert_eq!(top.get("msg").unwrap(), "hello");
        assert_eq!(data.len(), 1);
        assert_eq!(data.get("rows").unwrap(), 3);
    }

    #[test]
    fn test_obj_keeps_pairs() {
        let m = obj(&[("rows", json!(12)), ("path", v_str("a.csv"))]);
        assert_eq!(m.len(), 2);
        assert_eq!(m["path"], "a.csv");
    }
}
