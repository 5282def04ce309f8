use anyhow::{bail, Context, Result};
use sharkwatch::data::{analyze_csv, default_manifest_path, validate_schema, REQUIRED_COLUMNS};
use sharkwatch::logging::log_dataset_loaded;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() -> Result<()> {
    let path = PathBuf::from(
        env::args()
            .nth(1)
            .unwrap_or_else(|| "data/incidents.csv".to_string()),
    );

    let now_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let schema = validate_schema(&path).context("schema check failed")?;
    if !schema.ok {
        eprintln!("required columns: {:?}", REQUIRED_COLUMNS);
        bail!("{}", schema.message);
    }

    let (store, manifest) = analyze_csv(&path, now_ts)
        .with_context(|| format!("analysis of {} failed", path.display()))?;
    let report = store.report();
    log_dataset_loaded(
        &manifest.path,
        manifest.row_count,
        &manifest.hash_sha256,
        report.total_filled(),
        report.total_canonicalized(),
    );

    let out_path = default_manifest_path(&path);
    fs::write(&out_path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("failed to write {}", out_path.display()))?;
    println!("wrote manifest {}", out_path.display());
    Ok(())
}
