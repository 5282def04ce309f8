//! One-shot dashboard recompute from the command line.
//!
//! Usage:
//!   query <table.csv> [request.json] [attr=value ...] [years=MIN..MAX]
//!         [length=MIN..MAX] [--exclude-unknown-length] [select=LAT,LON ...]
//!
//! `attr` is an attribute id or column name (e.g. `state=WA`,
//! `Shark.common.name=tiger shark`). A request file is read first wherever it
//! appears; the other arguments refine it. Prints the bundle as JSON on stdout.

use anyhow::{anyhow, bail, Context, Result};
use sharkwatch::config::Config;
use sharkwatch::dashboard::{build, DashboardRequest};
use sharkwatch::data::RecordStore;
use sharkwatch::filter::{Criteria, LengthRange, YearRange};
use sharkwatch::record::Attribute;
use sharkwatch::selection::MapPoint;
use std::env;
use std::fs;
use std::path::Path;

fn parse_pair<T: std::str::FromStr>(raw: &str, sep: &str) -> Result<(T, T)> {
    let (a, b) = raw
        .split_once(sep)
        .ok_or_else(|| anyhow!("expected A{}B, got {}", sep, raw))?;
    let a = a.trim().parse().map_err(|_| anyhow!("bad value: {}", a))?;
    let b = b.trim().parse().map_err(|_| anyhow!("bad value: {}", b))?;
    Ok((a, b))
}

fn parse_request(args: &[String], store: &RecordStore) -> Result<DashboardRequest> {
    let (files, rest): (Vec<&String>, Vec<&String>) =
        args.iter().partition(|a| a.ends_with(".json"));
    let mut request = match files.as_slice() {
        [] => DashboardRequest::default(),
        [file] => {
            let text = fs::read_to_string(file).with_context(|| format!("reading {}", file))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", file))?
        }
        _ => bail!("at most one request file may be given"),
    };
    let mut criteria = request
        .criteria
        .take()
        .unwrap_or_else(|| Criteria::unfiltered(store));
    let mut refined = false;

    for arg in rest {
        refined = true;
        if arg == "--exclude-unknown-length" {
            criteria.include_unknown_length = false;
            continue;
        }
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got {}", arg))?;
        match key {
            "years" => {
                let (min, max) = parse_pair::<i32>(value, "..")?;
                criteria.year_range = YearRange { min, max };
            }
            "length" => {
                let (min, max) = parse_pair::<f64>(value, "..")?;
                criteria.shark_length_range = LengthRange { min, max };
            }
            "select" => {
                let (lat, lon) = parse_pair::<f64>(value, ",")?;
                request.selected_points.push(MapPoint { lat, lon });
            }
            _ => {
                let attribute: Attribute = key.parse().map_err(|e: String| anyhow!(e))?;
                match criteria.set_mut(attribute) {
                    Some(set) => {
                        set.insert(value.to_string());
                    }
                    None => bail!("{} cannot be filtered directly", attribute),
                }
            }
        }
    }
    if refined || files.len() == 1 {
        request.criteria = Some(criteria);
    }
    Ok(request)
}

fn main() -> Result<()> {
    let cfg = Config::from_env();
    let mut args = env::args().skip(1);
    let data_path = args.next().unwrap_or_else(|| cfg.data_path.clone());
    let store = RecordStore::load(Path::new(&data_path))
        .with_context(|| format!("loading {}", data_path))?;

    let rest: Vec<String> = args.collect();
    let request = parse_request(&rest, &store)?;
    let bundle = build(&store, &request, &cfg)?;
    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}
