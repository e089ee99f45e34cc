//! Acceptance checks for a regularized polygon.

use geo::Polygon;
use pre_event_inventory_models::FallbackReason;
use pre_event_spatial::overlap::{iou, is_usable_polygon};

use crate::metrics::vertex_count;

/// Decides whether `candidate` may replace `original`.
///
/// # Errors
///
/// * [`FallbackReason::InvalidResult`] if the candidate is invalid or has
///   no area
/// * [`FallbackReason::VertexIncrease`] if it has more vertices than
///   `original_vertices`
/// * [`FallbackReason::LowIou`] if its intersection-over-union with the
///   original is below `min_iou`
pub fn check(
    original: &Polygon<f64>,
    candidate: &Polygon<f64>,
    original_vertices: usize,
    min_iou: f64,
) -> Result<(), FallbackReason> {
    if !is_usable_polygon(candidate) {
        return Err(FallbackReason::InvalidResult);
    }
    if vertex_count(candidate) > original_vertices {
        return Err(FallbackReason::VertexIncrease);
    }
    match iou(original, candidate) {
        Some(score) if score >= min_iou => Ok(()),
        _ => Err(FallbackReason::LowIou),
    }
}
