//! Ring cleanup and Douglas-Peucker simplification on closed rings.
//!
//! Rings are handled open: the closing coordinate is dropped on the way in
//! and added back by [`close_ring`].

use geo::{Coord, LineString};

/// Points closer than this are treated as the same vertex.
const DUPLICATE_EPSILON: f64 = 1e-6;

pub(crate) fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Distance from `p` to the segment `a`-`b`.
pub(crate) fn segment_distance(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let ab = b - a;
    let len2 = ab.x.mul_add(ab.x, ab.y * ab.y);
    if len2 == 0.0 {
        return distance(p, a);
    }
    let ap = p - a;
    let t = (ap.x.mul_add(ab.x, ap.y * ab.y) / len2).clamp(0.0, 1.0);
    distance(p, a + ab * t)
}

/// Removes consecutive duplicates, including a trailing copy of the first
/// point.
pub fn dedup_points(points: impl IntoIterator<Item = Coord<f64>>) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::new();
    for point in points {
        if out
            .last()
            .is_none_or(|last| distance(*last, point) > DUPLICATE_EPSILON)
        {
            out.push(point);
        }
    }
    while out.len() > 1 && distance(out[0], out[out.len() - 1]) <= DUPLICATE_EPSILON {
        out.pop();
    }
    out
}

/// The distinct vertices of a ring, without the closing coordinate.
#[must_use]
pub fn open_ring(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    dedup_points(ring.0.iter().copied())
}

#[must_use]
pub fn close_ring(points: &[Coord<f64>]) -> LineString<f64> {
    let mut coords = points.to_vec();
    if let Some(&first) = points.first() {
        coords.push(first);
    }
    LineString::new(coords)
}

/// Marks the vertices of an open chain that Douglas-Peucker keeps. Both
/// endpoints are always kept.
fn mark_chain(points: &[Coord<f64>], tolerance: f64, keep: &mut [bool]) {
    let last = points.len() - 1;
    keep[0] = true;
    keep[last] = true;

    let mut stack = vec![(0, last)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let (index, dist) = (start + 1..end)
            .map(|i| (i, segment_distance(points[i], points[start], points[end])))
            .fold((start, f64::NEG_INFINITY), |best, current| {
                if current.1 > best.1 { current } else { best }
            });
        if dist > tolerance {
            keep[index] = true;
            stack.push((start, index));
            stack.push((index, end));
        }
    }
}

fn simplify_chain(points: &[Coord<f64>], tolerance: f64) -> Vec<Coord<f64>> {
    let mut keep = vec![false; points.len()];
    mark_chain(points, tolerance, &mut keep);
    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Simplifies an open ring, treating it as closed.
///
/// The ring is split at its first vertex and the vertex farthest from it,
/// each half is simplified as a chain, and the split vertex is dropped
/// afterwards if it turned out to lie within tolerance of its neighbours.
/// A vertex is kept only if it lies more than `tolerance` from the chord of
/// the surviving neighbours, so exactly collinear vertices are removed even
/// at zero tolerance.
#[must_use]
pub fn simplify_ring(points: &[Coord<f64>], tolerance: f64) -> Vec<Coord<f64>> {
    if points.len() <= 3 {
        return points.to_vec();
    }

    let anchor = points[0];
    let far = points
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, p)| (i, distance(anchor, *p)))
        .fold((1, f64::NEG_INFINITY), |best, current| {
            if current.1 > best.1 { current } else { best }
        })
        .0;

    let mut second: Vec<Coord<f64>> = points[far..].to_vec();
    second.push(anchor);

    let mut ring = simplify_chain(&points[..=far], tolerance);
    ring.pop();
    let mut tail = simplify_chain(&second, tolerance);
    tail.pop();
    ring.extend(tail);

    if ring.len() > 3 && segment_distance(ring[0], ring[ring.len() - 1], ring[1]) <= tolerance {
        ring.remove(0);
    }
    ring
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    #[test]
    fn dedup_drops_repeats_and_closing_point() {
        let points = dedup_points([
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 1.0, y: 0.0 },
            coord! { x: 1.0, y: 1.0 },
            coord! { x: 0.0, y: 0.0 },
        ]);
        assert_eq!(points.len(), 3);
    }

    #[test]
    fn removes_collinear_and_small_deviations() {
        let ring = vec![
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 5.0, y: 0.1 },
            coord! { x: 10.0, y: 0.0 },
            coord! { x: 10.0, y: 5.0 },
            coord! { x: 10.0, y: 10.0 },
            coord! { x: 0.0, y: 10.0 },
            coord! { x: 0.0, y: 5.0 },
        ];

        let simplified = simplify_ring(&ring, 0.5);
        assert_eq!(
            simplified,
            vec![
                coord! { x: 0.0, y: 0.0 },
                coord! { x: 10.0, y: 0.0 },
                coord! { x: 10.0, y: 10.0 },
                coord! { x: 0.0, y: 10.0 },
            ]
        );
    }

    #[test]
    fn zero_tolerance_keeps_real_corners() {
        let ring = vec![
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 4.0, y: 0.0 },
            coord! { x: 4.0, y: 2.0 },
            coord! { x: 2.0, y: 2.0 },
            coord! { x: 2.0, y: 4.0 },
            coord! { x: 0.0, y: 4.0 },
        ];
        assert_eq!(simplify_ring(&ring, 0.0), ring);
    }

    #[test]
    fn redundant_first_vertex_is_dropped() {
        let ring = vec![
            coord! { x: 5.0, y: 0.0 },
            coord! { x: 10.0, y: 0.0 },
            coord! { x: 10.0, y: 10.0 },
            coord! { x: 0.0, y: 10.0 },
            coord! { x: 0.0, y: 0.0 },
        ];
        assert_eq!(simplify_ring(&ring, 0.1).len(), 4);
    }
}
