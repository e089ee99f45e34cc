//! Dominant edge orientation of a ring.

use std::f64::consts::PI;

use geo::Coord;

use crate::simplify::distance;

/// Below this resultant length the quadrupled-angle average is considered
/// undefined and the longest edge decides.
const RESULTANT_EPSILON: f64 = 1e-9;

/// Smallest angle between two undirected directions, in `[0, PI/2]`.
#[must_use]
pub fn axial_difference(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(PI);
    d.min(PI - d)
}

/// Dominant orientation of a ring in radians, in `(-PI/4, PI/4]`.
///
/// Edge angles are quadrupled so that directions 90 degrees apart agree,
/// then averaged weighted by edge length. A rectangle rotated by `t`
/// yields `t` regardless of which side is longer.
///
/// Returns `None` for rings with no edge of positive length.
#[must_use]
pub fn dominant_orientation(ring: &[Coord<f64>]) -> Option<f64> {
    let n = ring.len();
    if n < 2 {
        return None;
    }

    let mut sin_sum = 0.0;
    let mut cos_sum = 0.0;
    let mut longest: Option<(f64, f64)> = None;

    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let length = distance(a, b);
        if length == 0.0 {
            continue;
        }
        let angle = (b.y - a.y).atan2(b.x - a.x);
        sin_sum += length * (4.0 * angle).sin();
        cos_sum += length * (4.0 * angle).cos();
        if longest.is_none_or(|(len, _)| length > len) {
            longest = Some((length, angle));
        }
    }

    let (_, fallback) = longest?;
    if sin_sum.hypot(cos_sum) < RESULTANT_EPSILON {
        return Some(normalize(fallback));
    }
    Some(sin_sum.atan2(cos_sum) / 4.0)
}

/// Folds an angle into `(-PI/4, PI/4]` modulo 90 degrees.
fn normalize(angle: f64) -> f64 {
    let quarter = PI / 2.0;
    let folded = angle.rem_euclid(quarter);
    if folded > quarter / 2.0 {
        folded - quarter
    } else {
        folded
    }
}
