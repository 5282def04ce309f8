//! Map selection: refines a filtered view to the records whose coordinates
//! were reported by the renderer's lasso/box selection.
//!
//! Matching is exact `f64` equality on the `(latitude, longitude)` pair. A
//! renderer that rounds coordinates before reporting them will select
//! nothing; this is a known limitation and no tolerance is applied.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::filter::View;
use crate::logging::log_selection;
use crate::record::Record;

/// Marker size for records outside an explicit selection.
pub const DIMMED_MARKER_SIZE: f64 = 0.3;
pub const FULL_MARKER_SIZE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub lat: f64,
    pub lon: f64,
}

impl MapPoint {
    fn key(&self) -> (u64, u64) {
        coord_key(self.lat, self.lon)
    }
}

// Bit patterns give exact-equality hashing; -0.0 is folded into 0.0 so the
// key agrees with `==`.
fn coord_key(lat: f64, lon: f64) -> (u64, u64) {
    fn bits(v: f64) -> u64 {
        if v == 0.0 {
            0.0f64.to_bits()
        } else {
            v.to_bits()
        }
    }
    (bits(lat), bits(lon))
}

/// Records selected on the map. Always a subset of the filtered view it was
/// derived from; equal to it when nothing was explicitly selected.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedView<'a> {
    pub view: View<'a>,
    /// False when no points were supplied and the whole filtered view stands
    /// in as the selection.
    pub explicit: bool,
    ids: HashSet<usize>,
}

impl<'a> SelectedView<'a> {
    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    pub fn contains(&self, record_id: usize) -> bool {
        self.ids.contains(&record_id)
    }

    /// Map marker size for a filtered record.
    pub fn marker_size(&self, record: &Record) -> f64 {
        if !self.explicit || self.contains(record.record_id) {
            FULL_MARKER_SIZE
        } else {
            DIMMED_MARKER_SIZE
        }
    }
}

pub fn derive_selection<'a>(filtered: &View<'a>, points: &[MapPoint]) -> SelectedView<'a> {
    let explicit = !points.is_empty();
    let view = if explicit {
        let wanted: HashSet<(u64, u64)> = points.iter().map(MapPoint::key).collect();
        filtered
            .iter()
            .filter(|r| {
                let (lat, lon) = r.coordinates();
                wanted.contains(&coord_key(lat, lon))
            })
            .collect()
    } else {
        filtered.clone()
    };
    let ids = view.iter().map(|r| r.record_id).collect();
    log_selection(points.len(), filtered.len(), view.len(), explicit);
    SelectedView { view, explicit, ids }
}
