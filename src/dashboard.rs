//! One full recompute per interaction: filter, then select, then aggregate.
//!
//! The bundle is everything the renderer needs for the map, the two
//! filtered-vs-selected bar charts, the heat map and the timeline. Nothing
//! here holds state between requests; the store is only read.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::aggregate::{
    comparison_counts, cross_tabulation, row_summary, time_histogram, ComparisonCount, CrossTab,
    Orientation, RowSummary, TimeBucket,
};
use crate::config::Config;
use crate::data::RecordStore;
use crate::error::{DashboardError, Result};
use crate::filter::{self, Criteria, LengthRange, YearRange};
use crate::logging::{log, obj, Domain, Level, ProfileScope};
use crate::record::Attribute;
use crate::selection::{derive_selection, MapPoint};

/// Inputs for one recompute. Omitted fields fall back to the unfiltered
/// criteria and the configured chart defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardRequest {
    #[serde(default)]
    pub criteria: Option<Criteria>,
    #[serde(default)]
    pub selected_points: Vec<MapPoint>,
    #[serde(default)]
    pub primary: Option<Attribute>,
    #[serde(default)]
    pub secondary: Option<Attribute>,
    #[serde(default)]
    pub primary_orientation: Orientation,
    #[serde(default)]
    pub secondary_orientation: Orientation,
    #[serde(default)]
    pub timeline_buckets: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowDetails {
    pub total: usize,
    pub filtered: RowSummary,
    pub selected: RowSummary,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub record_id: usize,
    pub lat: f64,
    pub lon: f64,
    pub hover_name: String,
    /// Value of the primary attribute, used for marker colour.
    pub color_value: String,
    pub detail_value: String,
    pub selected: bool,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonChart {
    pub attribute: Attribute,
    pub label: String,
    pub orientation: Orientation,
    pub bars: Vec<ComparisonCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardBundle {
    pub criteria_hash: String,
    pub rows: RowDetails,
    pub selection_explicit: bool,
    pub markers: Vec<MapMarker>,
    pub primary_chart: ComparisonChart,
    pub secondary_chart: ComparisonChart,
    pub heatmap: CrossTab,
    pub timeline: Vec<TimeBucket>,
}

pub fn build(
    store: &RecordStore,
    request: &DashboardRequest,
    cfg: &Config,
) -> Result<DashboardBundle> {
    let _profile = ProfileScope::new("dashboard_build");

    let criteria = match &request.criteria {
        Some(c) => c.clone(),
        None => Criteria::unfiltered(store),
    };
    let primary = request.primary.unwrap_or(cfg.primary);
    let secondary = request.secondary.unwrap_or(cfg.secondary);
    let buckets = request.timeline_buckets.unwrap_or(cfg.timeline_buckets);
    if buckets > cfg.max_timeline_buckets {
        return Err(DashboardError::InvalidRequest(format!(
            "timeline_buckets {} exceeds limit {}",
            buckets, cfg.max_timeline_buckets
        )));
    }

    let filtered = filter::apply(store.records(), &criteria)?;
    let selected = derive_selection(&filtered, &request.selected_points);

    let total = store.len();
    let filtered_rows = row_summary(&filtered, total)?;
    let selected_rows = row_summary(&selected.view, total)?;

    let markers = filtered
        .iter()
        .map(|r| MapMarker {
            record_id: r.record_id,
            lat: r.latitude,
            lon: r.longitude,
            hover_name: r.shark_full_name.clone(),
            color_value: r.category(primary).into_owned(),
            detail_value: r.category(secondary).into_owned(),
            selected: !selected.explicit || selected.contains(r.record_id),
            size: selected.marker_size(r),
        })
        .collect();

    let chart = |attribute: Attribute, orientation: Orientation| ComparisonChart {
        attribute,
        label: attribute.label().to_string(),
        orientation,
        bars: comparison_counts(&filtered, &selected.view, attribute),
    };

    let bundle = DashboardBundle {
        criteria_hash: criteria.fingerprint(),
        rows: RowDetails {
            total,
            filtered: filtered_rows,
            selected: selected_rows,
            description: describe_rows(&filtered_rows, &selected_rows),
        },
        selection_explicit: selected.explicit,
        markers,
        primary_chart: chart(primary, request.primary_orientation),
        secondary_chart: chart(secondary, request.secondary_orientation),
        heatmap: cross_tabulation(&filtered, primary, secondary),
        timeline: time_histogram(&filtered, buckets),
    };

    log(
        Level::Info,
        Domain::Aggregate,
        "bundle_built",
        obj(&[
            ("criteria_hash", json!(bundle.criteria_hash)),
            ("filtered", json!(filtered_rows.count)),
            ("selected", json!(selected_rows.count)),
            ("heatmap_cells", json!(bundle.heatmap.cells.len())),
            ("timeline_buckets", json!(bundle.timeline.len())),
        ]),
    );
    Ok(bundle)
}

pub fn describe_rows(filtered: &RowSummary, selected: &RowSummary) -> String {
    format!(
        "Filtered Data: {} rows ({:?}% of total rows). \
         Selected Data: {} rows ({:?}% of total rows).",
        filtered.count,
        filtered.percentage,
        selected.count,
        selected.percentage
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeOptions {
    pub attribute: Attribute,
    pub label: String,
    pub column: String,
    pub filterable: bool,
    pub values: Vec<String>,
}

/// Everything a UI needs to populate its filter widgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsCatalog {
    pub total_records: usize,
    pub attributes: Vec<AttributeOptions>,
    pub year_range: YearRange,
    pub length_range: Option<LengthRange>,
    pub reset: Criteria,
}

pub fn options_catalog(store: &RecordStore) -> OptionsCatalog {
    let attributes = Attribute::ALL
        .iter()
        .map(|&attribute| AttributeOptions {
            attribute,
            label: attribute.label().to_string(),
            column: attribute.column().to_string(),
            filterable: attribute.is_filterable(),
            values: store.distinct_values(attribute),
        })
        .collect();
    OptionsCatalog {
        total_records: store.len(),
        attributes,
        year_range: store.year_extent(),
        length_range: store.length_extent(),
        reset: Criteria::unfiltered(store),
    }
}
