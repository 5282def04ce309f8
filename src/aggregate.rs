//! Chart-ready summaries derived from a view. Every function here is a pure
//! read of its input and can run concurrently on the same view.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{DashboardError, Result};
use crate::filter::View;
use crate::record::Attribute;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub value: String,
    pub count: usize,
}

/// Which side of a comparison chart a count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Filtered,
    Selected,
}

impl Source {
    pub fn label(&self) -> &'static str {
        match self {
            Source::Filtered => "Filtered Data",
            Source::Selected => "Selected Data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonCount {
    pub value: String,
    pub source: Source,
    pub count: usize,
}

/// Axis that carries the category values on a bar chart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Categories on x, counts on y.
    #[default]
    Vertical,
    /// Counts on x, categories on y.
    Horizontal,
}

impl Orientation {
    pub fn toggled(self) -> Self {
        match self {
            Orientation::Vertical => Orientation::Horizontal,
            Orientation::Horizontal => Orientation::Vertical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossTabCell {
    pub a: String,
    pub b: String,
    pub count: usize,
}

/// Observed `(a, b)` combinations and their counts. Unobserved pairs are not
/// stored; [`CrossTab::count`] reports them as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossTab {
    pub attribute_a: Option<Attribute>,
    pub attribute_b: Option<Attribute>,
    pub a_values: Vec<String>,
    pub b_values: Vec<String>,
    pub cells: Vec<CrossTabCell>,
}

impl CrossTab {
    pub fn count(&self, a: &str, b: &str) -> usize {
        self.cells
            .iter()
            .find(|c| c.a == a && c.b == b)
            .map(|c| c.count)
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.cells.iter().map(|c| c.count).sum()
    }

    /// Same grid with the axes exchanged.
    pub fn transposed(&self) -> Self {
        Self {
            attribute_a: self.attribute_b,
            attribute_b: self.attribute_a,
            a_values: self.b_values.clone(),
            b_values: self.a_values.clone(),
            cells: self
                .cells
                .iter()
                .map(|c| CrossTabCell {
                    a: c.b.clone(),
                    b: c.a.clone(),
                    count: c.count,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub start: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RowSummary {
    pub count: usize,
    pub percentage: f64,
}

/// Counts per value in first-occurrence order. The `"unknown"` sentinel is an
/// ordinary bucket.
pub fn category_counts(view: &View<'_>, attribute: Attribute) -> Vec<CategoryCount> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<CategoryCount> = Vec::new();
    for r in view.iter() {
        let value = r.category(attribute);
        match index.get(&*value) {
            Some(&i) => out[i].count += 1,
            None => {
                index.insert(value.to_string(), out.len());
                out.push(CategoryCount {
                    value: value.into_owned(),
                    count: 1,
                });
            }
        }
    }
    out
}

/// Side-by-side counts of `attribute` over the filtered and selected views,
/// filtered rows first.
pub fn comparison_counts(
    filtered: &View<'_>,
    selected: &View<'_>,
    attribute: Attribute,
) -> Vec<ComparisonCount> {
    let tag = |source: Source, counts: Vec<CategoryCount>| {
        counts.into_iter().map(move |c| ComparisonCount {
            value: c.value,
            source,
            count: c.count,
        })
    };
    tag(Source::Filtered, category_counts(filtered, attribute))
        .chain(tag(Source::Selected, category_counts(selected, attribute)))
        .collect()
}

pub fn cross_tabulation(view: &View<'_>, a: Attribute, b: Attribute) -> CrossTab {
    let mut tab = CrossTab {
        attribute_a: Some(a),
        attribute_b: Some(b),
        ..CrossTab::default()
    };
    let mut cell_index: HashMap<(String, String), usize> = HashMap::new();
    for r in view.iter() {
        let va = r.category(a).into_owned();
        let vb = r.category(b).into_owned();
        if !tab.a_values.contains(&va) {
            tab.a_values.push(va.clone());
        }
        if !tab.b_values.contains(&vb) {
            tab.b_values.push(vb.clone());
        }
        let key = (va, vb);
        match cell_index.get(&key) {
            Some(&i) => tab.cells[i].count += 1,
            None => {
                cell_index.insert(key.clone(), tab.cells.len());
                tab.cells.push(CrossTabCell {
                    a: key.0,
                    b: key.1,
                    count: 1,
                });
            }
        }
    }
    tab
}

/// Partition incident dates into equal-width buckets spanning the earliest and
/// latest date in the view. Every bucket is returned, empty ones included. An
/// empty view (or zero buckets) yields no buckets.
///
/// Buckets are at least one day wide, so at most `span_days` buckets are
/// produced and every bucket has a distinct start date.
pub fn time_histogram(view: &View<'_>, bucket_count: usize) -> Vec<TimeBucket> {
    let mut dates = view.iter().map(|r| r.incident_date);
    let Some(first) = dates.next() else {
        return Vec::new();
    };
    if bucket_count == 0 {
        return Vec::new();
    }
    let (min, max) = dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
    let span_days = (max - min).num_days();
    if span_days == 0 {
        return vec![TimeBucket {
            start: min,
            count: view.len(),
        }];
    }

    let bucket_count = bucket_count.min(span_days as usize);
    let width = span_days as f64 / bucket_count as f64;
    let mut counts = vec![0usize; bucket_count];
    for r in view.iter() {
        let offset = (r.incident_date - min).num_days() as f64;
        let idx = ((offset / width).floor() as usize).min(bucket_count - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| TimeBucket {
            start: min + Duration::days((i as f64 * width).floor() as i64),
            count,
        })
        .collect()
}

/// Size of a view relative to the full table, as a percentage rounded to two
/// decimals with ties to even.
pub fn row_summary(view: &View<'_>, total: usize) -> Result<RowSummary> {
    let count = view.len();
    if total == 0 {
        return Err(DashboardError::Division);
    }
    let pct = 100.0 * count as f64 / total as f64;
    Ok(RowSummary {
        count,
        percentage: (pct * 100.0).round_ties_even() / 100.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{incident_date, Record, UNKNOWN};

    fn rec(id: usize, shark: &str, activity: &str, year: i32, month: u32) -> Record {
        Record {
            record_id: id,
            shark_type: shark.into(),
            shark_full_name: UNKNOWN.into(),
            injury_result: "injured".into(),
            injury_severity: "minor".into(),
            state: "WA".into(),
            location_type: "coastal".into(),
            victim_gender: "female".into(),
            data_source: "media".into(),
            victim_activity: activity.into(),
            provoked: "unprovoked".into(),
            shark_length_m: Some(2.0),
            incident_year: year,
            incident_month: month,
            incident_date: incident_date(year, month).unwrap(),
            latitude: -31.9,
            longitude: 115.8,
        }
    }

    #[test]
    fn test_category_counts_first_occurrence_order() {
        let records = vec![
            rec(0, "tiger shark", "surfing", 2000, 1),
            rec(1, UNKNOWN, "surfing", 2000, 1),
            rec(2, "tiger shark", "diving", 2000, 1),
            rec(3, UNKNOWN, "diving", 2000, 1),
        ];
        let view: View = records.iter().collect();
        let counts = category_counts(&view, Attribute::SharkType);
        assert_eq!(
            counts,
            vec![
                CategoryCount { value: "tiger shark".into(), count: 2 },
                CategoryCount { value: UNKNOWN.into(), count: 2 },
            ]
        );
    }

    #[test]
    fn test_comparison_counts_tags_sources() {
        let records = vec![
            rec(0, "tiger shark", "surfing", 2000, 1),
            rec(1, "white shark", "surfing", 2000, 1),
        ];
        let filtered: View = records.iter().collect();
        let selected: View = records[1..].iter().collect();
        let rows = comparison_counts(&filtered, &selected, Attribute::SharkType);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].source, Source::Filtered);
        assert_eq!(rows[2].source, Source::Selected);
        assert_eq!(rows[2].value, "white shark");
    }

    #[test]
    fn test_cross_tab_only_observed_cells() {
        let records = vec![
            rec(0, "tiger shark", "surfing", 2000, 1),
            rec(1, "tiger shark", "surfing", 2000, 1),
            rec(2, "white shark", "diving", 2000, 1),
        ];
        let view: View = records.iter().collect();
        let tab = cross_tabulation(&view, Attribute::SharkType, Attribute::VictimActivity);
        assert_eq!(tab.cells.len(), 2);
        assert_eq!(tab.count("tiger shark", "surfing"), 2);
        assert_eq!(tab.count("tiger shark", "diving"), 0);
        assert_eq!(tab.total(), 3);
        assert_eq!(tab.a_values, vec!["tiger shark", "white shark"]);
        let t = tab.transposed();
        assert_eq!(t.count("diving", "white shark"), 1);
        assert_eq!(t.attribute_a, Some(Attribute::VictimActivity));
    }

    #[test]
    fn test_time_histogram_equal_width() {
        let records = vec![
            rec(0, "a", "x", 2000, 1),
            rec(1, "a", "x", 2000, 2),
            rec(2, "a", "x", 2010, 1),
        ];
        let view: View = records.iter().collect();
        let buckets = time_histogram(&view, 10);
        assert_eq!(buckets.len(), 10);
        assert_eq!(buckets[0].start, incident_date(2000, 1).unwrap());
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[9].count, 1);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<usize>(), 3);
        assert!(buckets.windows(2).all(|w| w[0].start < w[1].start));

        // 60 days between the two dates: buckets never go below one day
        let short = vec![rec(0, "a", "x", 2000, 1), rec(1, "a", "x", 2000, 3)];
        let view: View = short.iter().collect();
        let buckets = time_histogram(&view, 100);
        assert_eq!(buckets.len(), 60);
        assert!(buckets.windows(2).all(|w| w[0].start < w[1].start));
        assert_eq!(buckets[0].count, 1);
        assert_eq!(buckets[59].count, 1);

        let huge = time_histogram(&view, usize::MAX);
        assert_eq!(huge.len(), 60);
    }

    #[test]
    fn test_time_histogram_empty_and_degenerate() {
        let empty: View = View::default();
        assert!(time_histogram(&empty, 10).is_empty());

        let records = vec![rec(0, "a", "x", 2000, 1), rec(1, "a", "x", 2000, 1)];
        let view: View = records.iter().collect();
        let buckets = time_histogram(&view, 10);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].count, 2);
        assert!(time_histogram(&view, 0).is_empty());
    }

    #[test]
    fn test_row_summary_rounds_to_two_decimals() {
        let records: Vec<Record> = (0..100).map(|i| rec(i, "a", "x", 2000, 1)).collect();
        let quarter: View = records[..25].iter().collect();
        assert_eq!(
            row_summary(&quarter, records.len()).unwrap(),
            RowSummary { count: 25, percentage: 25.0 }
        );
        let one: View = records[..1].iter().collect();
        let two: View = records[..2].iter().collect();
        assert_eq!(row_summary(&one, 3).unwrap().percentage, 33.33);
        assert_eq!(row_summary(&two, 3).unwrap().percentage, 66.67);

        // 0.125% sits exactly on a tie
        let many: Vec<Record> = (0..800).map(|i| rec(i, "a", "x", 2000, 1)).collect();
        let single: View = many[..1].iter().collect();
        let triple: View = many[..3].iter().collect();
        assert_eq!(row_summary(&single, 800).unwrap().percentage, 0.12);
        assert_eq!(row_summary(&triple, 800).unwrap().percentage, 0.38);
        assert!(matches!(
            row_summary(&View::default(), 0),
            Err(DashboardError::Division)
        ));
    }

    #[test]
    fn test_orientation_toggle() {
        assert_eq!(Orientation::default(), Orientation::Vertical);
        assert_eq!(Orientation::Vertical.toggled(), Orientation::Horizontal);
        assert_eq!(Orientation::Horizontal.toggled().toggled(), Orientation::Horizontal);
    }
}
