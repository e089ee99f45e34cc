//! Overlap and intersection-over-union between polygons.
//!
//! Areas are in square units of whatever frame the inputs are in. Callers
//! comparing scores must keep every input in the same frame.

use geo::{Area, BooleanOps, BoundingRect, MultiPolygon, Polygon, Validation};
use rstar::{AABB, Envelope};

/// Whether a polygon can take part in area computations: closed, finite,
/// non-self-intersecting, and with positive area.
#[must_use]
pub fn is_usable_polygon(polygon: &Polygon<f64>) -> bool {
    polygon.exterior().0.len() >= 4 && polygon.unsigned_area() > 0.0 && polygon.is_valid()
}

/// [`is_usable_polygon`] for multi-polygons. Empty multi-polygons are not
/// usable.
#[must_use]
pub fn is_usable_multipolygon(multi: &MultiPolygon<f64>) -> bool {
    !multi.0.is_empty() && multi.unsigned_area() > 0.0 && multi.is_valid()
}

/// Bounding envelope of any geometry with a bounding rectangle.
pub fn envelope<G: BoundingRect<f64>>(geometry: &G) -> Option<AABB<[f64; 2]>> {
    let rect: Option<geo::Rect<f64>> = geometry.bounding_rect().into();
    rect.map(|r| AABB::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y]))
}

/// Intersection area without validity checks.
///
/// Returns `None` if the boolean operation panics, which the overlay
/// engine can do on pathological input.
#[must_use]
pub fn intersection_area(a: &Polygon<f64>, b: &MultiPolygon<f64>) -> Option<f64> {
    std::panic::catch_unwind(|| a.intersection(b).unsigned_area())
        .ok()
        .filter(|area| area.is_finite())
}

/// Scores how much of `footprint` lies inside `parcel`.
///
/// `None` means the pair has no usable score (either geometry is invalid
/// or the computation failed). Disjoint envelopes score `Some(0.0)`
/// without running the overlay.
#[must_use]
pub fn overlap_score(footprint: &Polygon<f64>, parcel: &MultiPolygon<f64>) -> Option<f64> {
    if !is_usable_polygon(footprint) || !is_usable_multipolygon(parcel) {
        return None;
    }
    match (envelope(footprint), envelope(parcel)) {
        (Some(a), Some(b)) if !a.intersects(&b) => Some(0.0),
        _ => intersection_area(footprint, parcel),
    }
}

/// Area of the intersection of a footprint and a parcel.
///
/// Degenerate or invalid inputs yield `0.0` rather than an error.
#[must_use]
pub fn overlap(footprint: &Polygon<f64>, parcel: &MultiPolygon<f64>) -> f64 {
    overlap_score(footprint, parcel).unwrap_or(0.0)
}

/// Intersection-over-union of two polygons, in `[0, 1]`.
///
/// `None` if either polygon is unusable or the union has no area.
#[must_use]
pub fn iou(a: &Polygon<f64>, b: &Polygon<f64>) -> Option<f64> {
    if !is_usable_polygon(a) || !is_usable_polygon(b) {
        return None;
    }
    let inter = intersection_area(a, &MultiPolygon(vec![b.clone()]))?;
    let union = a.unsigned_area() + b.unsigned_area() - inter;
    if union <= 0.0 {
        return None;
    }
    Some((inter / union).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(x: f64, y: f64, size: f64) -> Polygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]
    }

    #[test]
    fn overlap_of_partially_covered_footprint() {
        let footprint = square(0.0, 0.0, 10.0);
        let parcel = MultiPolygon(vec![square(5.0, -5.0, 20.0)]);

        let area = overlap(&footprint, &parcel);
        assert!((area - 50.0).abs() < 1e-9, "expected 50, got {area}");
    }

    #[test]
    fn disjoint_envelopes_score_zero() {
        let footprint = square(0.0, 0.0, 1.0);
        let parcel = MultiPolygon(vec![square(100.0, 100.0, 1.0)]);
        assert_eq!(overlap_score(&footprint, &parcel), Some(0.0));
    }

    #[test]
    fn self_intersecting_footprint_has_no_score() {
        let bowtie = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ];
        let parcel = MultiPolygon(vec![square(0.0, 0.0, 10.0)]);

        assert_eq!(overlap_score(&bowtie, &parcel), None);
        assert!(overlap(&bowtie, &parcel).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_parcel_has_no_score() {
        let footprint = square(0.0, 0.0, 1.0);
        assert_eq!(overlap_score(&footprint, &MultiPolygon(vec![])), None);
    }

    #[test]
    fn iou_of_identical_and_shifted_squares() {
        let a = square(0.0, 0.0, 10.0);
        assert!((iou(&a, &a).unwrap() - 1.0).abs() < 1e-9);

        let b = square(5.0, 0.0, 10.0);
        // 50 / (100 + 100 - 50)
        assert!((iou(&a, &b).unwrap() - 1.0 / 3.0).abs() < 1e-9);
    }
}
