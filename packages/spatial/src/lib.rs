#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry primitives for footprint/parcel matching.
//!
//! Provides the overlap matcher ([`overlap::overlap`]), intersection over
//! union, UTM reprojection, `GeoJSON` conversion helpers, and the
//! run-scoped [`ParcelCache`] that holds per-parcel validity and
//! envelopes so the resolver never recomputes them.

pub mod convert;
pub mod overlap;
pub mod projection;

use geo::{MultiPolygon, Polygon};
use pre_event_inventory_models::Parcel;
use rstar::{AABB, Envelope};

pub use projection::{ProjectionError, UtmZone};

/// Validity and envelope of one parcel, computed once per run.
#[derive(Debug, Clone)]
pub struct PreparedParcel {
    valid: bool,
    envelope: Option<AABB<[f64; 2]>>,
}

impl PreparedParcel {
    /// Inspects a parcel geometry.
    #[must_use]
    pub fn new(geometry: &MultiPolygon<f64>) -> Self {
        Self {
            valid: overlap::is_usable_multipolygon(geometry),
            envelope: overlap::envelope(geometry),
        }
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Validity and envelope of one footprint, computed once per group.
#[derive(Debug, Clone)]
pub struct PreparedFootprint {
    valid: bool,
    envelope: Option<AABB<[f64; 2]>>,
}

impl PreparedFootprint {
    #[must_use]
    pub fn new(geometry: &Polygon<f64>) -> Self {
        Self {
            valid: overlap::is_usable_polygon(geometry),
            envelope: overlap::envelope(geometry),
        }
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Prepared parcel data for one run, indexed like the parcel collection.
///
/// Owned by the orchestrator and passed explicitly to the resolver. It is
/// cleared and rebuilt at the start of every run.
#[derive(Debug, Default)]
pub struct ParcelCache {
    entries: Vec<PreparedParcel>,
}

impl ParcelCache {
    /// Creates an empty cache.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Drops every prepared entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replaces the cache contents. `prepared[i]` must describe parcel `i`.
    pub fn prepare(&mut self, prepared: Vec<PreparedParcel>) {
        self.entries = prepared;
        let invalid = self.entries.iter().filter(|e| !e.valid).count();
        if invalid > 0 {
            log::warn!(
                "{invalid} of {} parcels have unusable geometry and cannot be scored",
                self.entries.len()
            );
        }
    }

    /// Prepares every parcel sequentially.
    pub fn prepare_all(&mut self, parcels: &[Parcel]) {
        self.prepare(
            parcels
                .iter()
                .map(|p| PreparedParcel::new(&p.geometry))
                .collect(),
        );
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prepared data for parcel `index`, if the cache covers it.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PreparedParcel> {
        self.entries.get(index)
    }

    /// Overlap score of a footprint against parcel `index`.
    ///
    /// `None` when either side is unusable, the parcel is not in the
    /// cache, or the overlay failed. Disjoint envelopes score `Some(0.0)`.
    #[must_use]
    pub fn overlap_score(
        &self,
        footprint: &Polygon<f64>,
        prepared: &PreparedFootprint,
        parcel: &MultiPolygon<f64>,
        index: usize,
    ) -> Option<f64> {
        let entry = self.entries.get(index)?;
        if !prepared.valid || !entry.valid {
            return None;
        }
        match (&prepared.envelope, &entry.envelope) {
            (Some(a), Some(b)) if !a.intersects(b) => Some(0.0),
            _ => overlap::intersection_area(footprint, parcel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use pre_event_inventory_models::{Attributes, PARCEL_SCHEMA};

    fn parcel(polygon: Polygon<f64>) -> Parcel {
        Parcel {
            parcel_key: "p".to_string(),
            geometry: MultiPolygon(vec![polygon]),
            attributes: Attributes::empty(&PARCEL_SCHEMA),
        }
    }

    #[test]
    fn cache_scores_against_prepared_parcels() {
        let parcels = vec![
            parcel(polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 0.0, y: 4.0), (x: 0.0, y: 0.0)]),
            parcel(polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 4.0), (x: 4.0, y: 0.0), (x: 0.0, y: 4.0), (x: 0.0, y: 0.0)]),
            parcel(polygon![(x: 50.0, y: 50.0), (x: 51.0, y: 50.0), (x: 51.0, y: 51.0), (x: 50.0, y: 50.0)]),
        ];
        let mut cache = ParcelCache::new();
        cache.prepare_all(&parcels);
        assert_eq!(cache.len(), 3);
        assert!(cache.get(0).unwrap().is_valid());
        assert!(!cache.get(1).unwrap().is_valid());

        let footprint = polygon![(x: 1.0, y: 1.0), (x: 3.0, y: 1.0), (x: 3.0, y: 3.0), (x: 1.0, y: 3.0), (x: 1.0, y: 1.0)];
        let prepared = PreparedFootprint::new(&footprint);

        let full = cache.overlap_score(&footprint, &prepared, &parcels[0].geometry, 0);
        assert!((full.unwrap() - 4.0).abs() < 1e-9);
        assert_eq!(cache.overlap_score(&footprint, &prepared, &parcels[1].geometry, 1), None);
        assert_eq!(cache.overlap_score(&footprint, &prepared, &parcels[2].geometry, 2), Some(0.0));
        assert_eq!(cache.overlap_score(&footprint, &prepared, &parcels[0].geometry, 9), None);
    }

    #[test]
    fn clear_invalidates_everything() {
        let mut cache = ParcelCache::new();
        cache.prepare_all(&[parcel(polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)])]);
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(0).is_none());
    }
}
