//! Shape statistics reported for regularized footprints.

use std::f64::consts::FRAC_PI_4;

use geo::{Area, Polygon};

use crate::orientation::axial_difference;

/// An edge within this many degrees of a canonical direction counts as
/// orthogonal.
pub const ORTHOGONALITY_TOLERANCE_DEG: f64 = 2.0;

/// Distinct vertices over every ring of the polygon.
#[must_use]
pub fn vertex_count(polygon: &Polygon<f64>) -> usize {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| {
            let n = ring.0.len();
            if n > 1 && ring.is_closed() { n - 1 } else { n }
        })
        .sum()
}

/// Percentage of exterior edges lying within
/// [`ORTHOGONALITY_TOLERANCE_DEG`] of 0, 45, 90, or 135 degrees in the
/// polygon's own frame. Zero-length edges count as non-orthogonal.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn orthogonality_pct(polygon: &Polygon<f64>) -> f64 {
    let coords = &polygon.exterior().0;
    if coords.len() < 3 {
        return 0.0;
    }
    let tolerance = ORTHOGONALITY_TOLERANCE_DEG.to_radians();

    let edges = coords.len() - 1;
    let orthogonal = coords
        .windows(2)
        .filter(|w| {
            let dx = w[1].x - w[0].x;
            let dy = w[1].y - w[0].y;
            if dx == 0.0 && dy == 0.0 {
                return false;
            }
            let angle = dy.atan2(dx);
            (0..4).any(|k| axial_difference(angle, f64::from(k) * FRAC_PI_4) <= tolerance)
        })
        .count();

    orthogonal as f64 / edges as f64 * 100.0
}

/// Signed area change from `before` to `after`, in percent of `before`.
#[must_use]
pub fn area_change_pct(before: &Polygon<f64>, after: &Polygon<f64>) -> Option<f64> {
    let base = before.unsigned_area();
    if base <= 0.0 {
        return None;
    }
    Some((after.unsigned_area() - base) / base * 100.0)
}

/// How regularization changed one footprint, measured in its projected
/// frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeChange {
    pub area_change_pct: f64,
    pub orthogonality_before_pct: f64,
    pub orthogonality_after_pct: f64,
}

impl ShapeChange {
    #[must_use]
    pub fn measure(before: &Polygon<f64>, after: &Polygon<f64>) -> Self {
        Self {
            area_change_pct: area_change_pct(before, after).unwrap_or(0.0),
            orthogonality_before_pct: orthogonality_pct(before),
            orthogonality_after_pct: orthogonality_pct(after),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn counts_vertices_without_closing_points() {
        let square = polygon![
            exterior: [(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 0.0, y: 4.0)],
            interiors: [[(x: 1.0, y: 1.0), (x: 2.0, y: 1.0), (x: 2.0, y: 2.0)]],
        ];
        assert_eq!(vertex_count(&square), 7);
    }

    #[test]
    fn orthogonality_counts_diagonals() {
        let chamfered = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 7.0),
            (x: 7.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ];
        assert!((orthogonality_pct(&chamfered) - 100.0).abs() < 1e-9);

        let skewed = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 12.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ];
        assert!((orthogonality_pct(&skewed) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn area_change_is_relative_to_before() {
        let before = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)];
        let after = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 9.0), (x: 0.0, y: 9.0)];
        assert!((area_change_pct(&before, &after).unwrap() + 10.0).abs() < 1e-9);
    }
}
