//! Edge snapping, parallel merging, and corner reconstruction.
//!
//! Each edge of the simplified ring becomes a [`WallLine`]: an infinite
//! line through the edge midpoint, rotated onto a canonical direction when
//! that moves the edge little enough. Adjacent parallel walls close to each
//! other are merged, and the output ring is rebuilt from the intersections
//! of consecutive walls.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use geo::{Coord, coord};

use crate::orientation::axial_difference;
use crate::simplify::distance;

/// Walls whose directions differ by less than this are parallel.
const PARALLEL_EPSILON: f64 = 1e-6;

/// Consecutive walls meeting at a smaller angle than this (sine) get a
/// connector instead of an intersection.
const MIN_CORNER_SINE: f64 = 0.1;

/// The canonical directions for one footprint.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalAngles {
    theta: f64,
    allow_diagonal: bool,
    diagonal_reduction: f64,
}

impl CanonicalAngles {
    /// `theta` is the dominant orientation in radians; the reduction is in
    /// degrees.
    #[must_use]
    pub fn new(theta: f64, allow_diagonal: bool, diagonal_reduction_deg: f64) -> Self {
        Self {
            theta,
            allow_diagonal,
            diagonal_reduction: diagonal_reduction_deg.to_radians(),
        }
    }

    fn closest(&self, angle: f64, offsets: [f64; 2]) -> (f64, f64) {
        offsets
            .into_iter()
            .map(|o| {
                let target = self.theta + o;
                (target, axial_difference(angle, target))
            })
            .fold((self.theta, f64::INFINITY), |best, current| {
                if current.1 < best.1 { current } else { best }
            })
    }

    /// Nearest canonical direction to `angle` and the deviation from it,
    /// both in radians. The direction is undirected.
    #[must_use]
    pub fn nearest(&self, angle: f64) -> (f64, f64) {
        let ortho = self.closest(angle, [0.0, FRAC_PI_2]);
        if !self.allow_diagonal {
            return ortho;
        }
        let diagonal = self.closest(angle, [FRAC_PI_4, 3.0 * FRAC_PI_4]);
        if diagonal.1 + self.diagonal_reduction < ortho.1 {
            diagonal
        } else {
            ortho
        }
    }
}

/// An infinite line standing in for one or more consecutive ring edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallLine {
    /// A point on the line.
    pub anchor: Coord<f64>,
    /// Direction in radians, following the ring's winding.
    pub angle: f64,
    /// Total length of the edges the wall replaces.
    pub length: f64,
    /// Original first and last vertex of those edges.
    pub start: Coord<f64>,
    pub end: Coord<f64>,
    pub snapped: bool,
}

impl WallLine {
    fn direction(&self) -> Coord<f64> {
        let (sin, cos) = self.angle.sin_cos();
        coord! { x: cos, y: sin }
    }

    /// Signed distance of `point` from this line.
    fn offset_of(&self, point: Coord<f64>) -> f64 {
        let d = self.direction();
        let v = point - self.anchor;
        d.x.mul_add(v.y, -(d.y * v.x))
    }

    /// Foot of the perpendicular from `point`.
    #[must_use]
    pub fn project(&self, point: Coord<f64>) -> Coord<f64> {
        let d = self.direction();
        let v = point - self.anchor;
        self.anchor + d * d.x.mul_add(v.x, d.y * v.y)
    }

    fn is_parallel_to(&self, other: &Self) -> bool {
        axial_difference(self.angle, other.angle) < PARALLEL_EPSILON
            && (self.angle - other.angle).cos() > 0.0
    }

    fn merge(&self, other: &Self) -> Self {
        let length = self.length + other.length;
        Self {
            anchor: (self.anchor * self.length + other.anchor * other.length) / length,
            angle: self.angle,
            length,
            start: self.start,
            end: other.end,
            snapped: self.snapped && other.snapped,
        }
    }

    /// Intersection with `other`, or `None` if the two are near parallel.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Coord<f64>> {
        let d1 = self.direction();
        let d2 = other.direction();
        let denom = d1.x.mul_add(d2.y, -(d1.y * d2.x));
        if denom.abs() < MIN_CORNER_SINE {
            return None;
        }
        let w = other.anchor - self.anchor;
        let t = w.x.mul_add(d2.y, -(w.y * d2.x)) / denom;
        Some(self.anchor + d1 * t)
    }
}

/// One wall per ring edge. Zero-length edges are skipped.
///
/// An edge is rotated about its midpoint onto the nearest canonical
/// direction only if neither endpoint moves sideways by more than
/// `snap_tolerance`; otherwise it keeps its own direction.
#[must_use]
pub fn wall_lines(
    ring: &[Coord<f64>],
    angles: &CanonicalAngles,
    snap_tolerance: f64,
) -> Vec<WallLine> {
    let n = ring.len();
    let mut lines = Vec::with_capacity(n);

    for i in 0..n {
        let start = ring[i];
        let end = ring[(i + 1) % n];
        let length = distance(start, end);
        if length == 0.0 {
            continue;
        }
        let own = (end.y - start.y).atan2(end.x - start.x);
        let (target, deviation) = angles.nearest(own);
        let lateral = length / 2.0 * deviation.sin();

        let (angle, snapped) = if lateral <= snap_tolerance {
            let directed = if (own - target).cos() < 0.0 {
                target + PI
            } else {
                target
            };
            (directed, true)
        } else {
            (own, false)
        };

        lines.push(WallLine {
            anchor: (start + end) / 2.0,
            angle,
            length,
            start,
            end,
            snapped,
        });
    }

    lines
}

/// Merges consecutive parallel walls whose offset is within `tolerance`,
/// including across the ring's start.
#[must_use]
pub fn merge_parallel(lines: Vec<WallLine>, tolerance: f64) -> Vec<WallLine> {
    let mergeable = |a: &WallLine, b: &WallLine| {
        a.is_parallel_to(b) && a.offset_of(b.anchor).abs() <= tolerance
    };

    let mut merged: Vec<WallLine> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.last_mut() {
            Some(last) if mergeable(last, &line) => *last = last.merge(&line),
            _ => merged.push(line),
        }
    }

    while merged.len() > 1 {
        let last = merged[merged.len() - 1];
        if !mergeable(&last, &merged[0]) {
            break;
        }
        merged[0] = last.merge(&merged[0]);
        merged.pop();
    }

    merged
}

/// Rebuilds ring vertices from consecutive walls.
///
/// Where two walls are near parallel, or would meet implausibly far from
/// the corner they replace, the original corner is projected onto each
/// wall and both feet become vertices.
#[must_use]
pub fn reconstruct(lines: &[WallLine]) -> Vec<Coord<f64>> {
    let n = lines.len();
    let mut points = Vec::with_capacity(n + 2);

    for i in 0..n {
        let current = &lines[i];
        let next = &lines[(i + 1) % n];
        let corner = current.end;
        let reach = current.length.max(next.length);

        match current.intersection(next) {
            Some(point) if distance(point, corner) <= reach => points.push(point),
            _ => {
                points.push(current.project(corner));
                points.push(next.project(corner));
            }
        }
    }

    points
}
