#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Footprint regularization.
//!
//! Turns a noisy building outline into an orthogonally aligned polygon with
//! fewer vertices:
//!
//! 1. drop duplicate and near-collinear vertices (Douglas-Peucker)
//! 2. find the dominant edge orientation
//! 3. rotate each edge onto 0/45/90/135 degrees relative to it
//! 4. merge adjacent parallel walls and rebuild corners from intersections
//! 5. simplify again and check the result against the original
//!
//! All distances are metres, so work happens in a projected frame;
//! [`regularize_geographic`] handles the round trip from longitude and
//! latitude. Any failure returns the input geometry untouched together with
//! a [`FallbackReason`]. Nothing here panics out or returns an error.

pub mod fidelity;
pub mod metrics;
pub mod orientation;
pub mod simplify;
pub mod snap;

use std::panic;

use geo::Polygon;
use pre_event_inventory_models::{FallbackReason, GeometryStatus, RegularizationConfig};
use pre_event_spatial::{ProjectionError, UtmZone, overlap::is_usable_polygon, projection};

pub use metrics::ShapeChange;

/// Result of regularizing one footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct RegularizeOutcome {
    /// The regularized polygon, or an exact copy of the input on fallback.
    pub polygon: Polygon<f64>,
    pub fell_back: bool,
    /// Input vertices minus output vertices. Zero on fallback.
    pub vertices_removed: usize,
    pub reason: Option<FallbackReason>,
    /// Area and orthogonality change, present when the result was
    /// accepted.
    pub shape: Option<ShapeChange>,
}

impl RegularizeOutcome {
    fn fallback(original: &Polygon<f64>, reason: FallbackReason) -> Self {
        Self {
            polygon: original.clone(),
            fell_back: true,
            vertices_removed: 0,
            reason: Some(reason),
            shape: None,
        }
    }

    /// The record-level status this outcome maps to.
    #[must_use]
    pub const fn status(&self) -> GeometryStatus {
        match self.reason {
            Some(reason) => GeometryStatus::FellBack(reason),
            None => GeometryStatus::Regularized {
                vertices_removed: self.vertices_removed,
            },
        }
    }
}

struct Accepted {
    polygon: Polygon<f64>,
    vertices_removed: usize,
    shape: ShapeChange,
}

fn attempt(
    polygon: &Polygon<f64>,
    config: &RegularizationConfig,
) -> Result<Accepted, FallbackReason> {
    if !is_usable_polygon(polygon) {
        return Err(FallbackReason::Degenerate);
    }
    let original_vertices = metrics::vertex_count(polygon);

    let ring = simplify::simplify_ring(
        &simplify::open_ring(polygon.exterior()),
        config.simplify_tolerance_m,
    );
    if ring.len() < 3 {
        return Err(FallbackReason::Degenerate);
    }

    let theta = orientation::dominant_orientation(&ring).ok_or(FallbackReason::Degenerate)?;
    let angles = snap::CanonicalAngles::new(
        theta,
        config.allow_45_degree,
        config.diagonal_threshold_reduction_deg,
    );

    let walls = snap::merge_parallel(
        snap::wall_lines(&ring, &angles, config.snap_tolerance_m),
        config.parallel_merge_tolerance_m,
    );
    if walls.len() < 3 {
        return Err(FallbackReason::Degenerate);
    }

    let corners = simplify::simplify_ring(
        &simplify::dedup_points(snap::reconstruct(&walls)),
        config.simplify_tolerance_m,
    );
    if corners.len() < 3 {
        return Err(FallbackReason::Degenerate);
    }

    let candidate = Polygon::new(simplify::close_ring(&corners), polygon.interiors().to_vec());
    fidelity::check(polygon, &candidate, original_vertices, config.min_acceptable_iou)?;

    Ok(Accepted {
        vertices_removed: original_vertices - metrics::vertex_count(&candidate),
        shape: ShapeChange::measure(polygon, &candidate),
        polygon: candidate,
    })
}

/// Regularizes a polygon already in a metric projected frame.
#[must_use]
pub fn regularize(polygon: &Polygon<f64>, config: &RegularizationConfig) -> RegularizeOutcome {
    match panic::catch_unwind(|| attempt(polygon, config)) {
        Ok(Ok(accepted)) => RegularizeOutcome {
            polygon: accepted.polygon,
            fell_back: false,
            vertices_removed: accepted.vertices_removed,
            reason: None,
            shape: Some(accepted.shape),
        },
        Ok(Err(reason)) => RegularizeOutcome::fallback(polygon, reason),
        Err(_) => {
            log::warn!("Regularization panicked; keeping original geometry");
            RegularizeOutcome::fallback(polygon, FallbackReason::Internal)
        }
    }
}

fn project(polygon: &Polygon<f64>) -> Result<(UtmZone, Polygon<f64>), ProjectionError> {
    let zone = UtmZone::for_polygon(polygon)?;
    Ok((zone, projection::to_projected(polygon, zone)?))
}

/// Regularizes a polygon in longitude/latitude.
///
/// The polygon is projected into the UTM zone of its own centroid,
/// regularized there, and projected back. On any failure the returned
/// polygon is a copy of `polygon` itself, not a round-tripped version.
///
/// Empty, zero-area, and self-intersecting input falls back as
/// [`FallbackReason::Degenerate`] before any projection is attempted, so
/// [`FallbackReason::Reprojection`] only counts coordinates the projection
/// itself rejects.
#[must_use]
pub fn regularize_geographic(
    polygon: &Polygon<f64>,
    config: &RegularizationConfig,
) -> RegularizeOutcome {
    if !is_usable_polygon(polygon) {
        return RegularizeOutcome::fallback(polygon, FallbackReason::Degenerate);
    }

    let (zone, projected) = match project(polygon) {
        Ok(projected) => projected,
        Err(e) => {
            log::trace!("Cannot project footprint: {e}");
            return RegularizeOutcome::fallback(polygon, FallbackReason::Reprojection);
        }
    };

    let outcome = regularize(&projected, config);
    if let Some(reason) = outcome.reason {
        return RegularizeOutcome::fallback(polygon, reason);
    }

    match projection::to_geographic(&outcome.polygon, zone) {
        Ok(back) if is_usable_polygon(&back) => RegularizeOutcome {
            polygon: back,
            ..outcome
        },
        Ok(_) => RegularizeOutcome::fallback(polygon, FallbackReason::InvalidResult),
        Err(e) => {
            log::trace!("Cannot unproject regularized footprint from {zone}: {e}");
            RegularizeOutcome::fallback(polygon, FallbackReason::Reprojection)
        }
    }
}
