//!
//! Shared geometric primitives: points, vectors, segments and a handful of
//! free functions (rectangle clipping, weighted circle tests) used by both
//! the triangulation and the pixel-assignment modules.
//!

use nalgebra::{Point2, Vector2};

/// A point in continuous domain coordinates.
pub type Point = Point2<f64>;

/// A displacement in continuous domain coordinates.
pub type Vector = Vector2<f64>;

/// A stable integer identity for a site, dense in `[0, n)`.
pub type SiteIndex = u32;

/// An unordered pair of vertex identities in the triangulation.
pub type Edge = (SiteIndex, SiteIndex);

/// Builds the canonical (smaller, larger) form of an edge so it can be used
/// as a hash map key regardless of traversal direction.
pub fn normalize_edge(a: SiteIndex, b: SiteIndex) -> Edge {
    if a < b { (a, b) } else { (b, a) }
}

/// A finite line segment between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub source: Point,
    pub target: Point,
}

impl Segment {
    pub fn new(source: Point, target: Point) -> Self {
        Self { source, target }
    }

    pub fn length(&self) -> f64 {
        (self.target - self.source).norm()
    }

    /// Point at parameter `t` along the segment, `t = 0` at `source`.
    pub fn at(&self, t: f64) -> Point {
        self.source + (self.target - self.source) * t
    }
}

/// A weighted point: a site position plus its power-diagram weight.
#[derive(Debug, Clone, Copy)]
pub struct WeightedPoint {
    pub position: Point,
    pub weight: f64,
}

impl WeightedPoint {
    pub fn new(position: Point, weight: f64) -> Self {
        Self { position, weight }
    }

    /// The power distance `‖p − x‖² − w` from this weighted point to `x`.
    pub fn power_distance(&self, x: Point) -> f64 {
        (self.position - x).norm_squared() - self.weight
    }
}

/// Clips a segment against the axis-aligned rectangle `[min, max]` using the
/// Liang-Barsky parametric algorithm. Returns `None` if the segment does not
/// intersect the rectangle at all.
pub fn clip_segment_to_rect(p0: Point, p1: Point, min: Point, max: Point) -> Option<Segment> {
    let d = p1 - p0;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    let checks = [
        (-d.x, p0.x - min.x),
        (d.x, max.x - p0.x),
        (-d.y, p0.y - min.y),
        (d.y, max.y - p0.y),
    ];

    for (p, q) in checks {
        if p.abs() < 1e-15 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            if r > t0 {
                t0 = r;
            }
        } else {
            if r < t0 {
                return None;
            }
            if r < t1 {
                t1 = r;
            }
        }
    }

    if t0 > t1 {
        return None;
    }

    Some(Segment::new(p0 + d * t0, p0 + d * t1))
}

/// The power center (generalized circumcenter) of three weighted points,
/// plus the common power value at which all three are equidistant.
///
/// Generalizes the plain circumcenter formula by subtracting each point's
/// weight from its lifted coordinate before solving the 2x2 linear system.
/// Returns `None` if the three positions are collinear (degenerate).
pub fn power_center(
    a: &WeightedPoint,
    b: &WeightedPoint,
    c: &WeightedPoint,
) -> Option<(Point, f64)> {
    let p1 = b.position - a.position;
    let p2 = c.position - a.position;

    let denom = 2.0 * (p1.x * p2.y - p1.y * p2.x);
    if denom.abs() < 1e-12 {
        return None;
    }

    let rhs1 = p1.x * p1.x + p1.y * p1.y - (b.weight - a.weight);
    let rhs2 = p2.x * p2.x + p2.y * p2.y - (c.weight - a.weight);

    let ux = (p2.y * rhs1 - p1.y * rhs2) / denom;
    let uy = (p1.x * rhs2 - p2.x * rhs1) / denom;

    let center = Point::new(a.position.x + ux, a.position.y + uy);
    let power_value = ux * ux + uy * uy - a.weight;
    Some((center, power_value))
}

/// Generalized in-circle predicate for weighted points: true when `d` lies
/// inside (or on) the power circle through `a`, `b`, `c`.
pub fn in_power_circle(
    a: &WeightedPoint,
    b: &WeightedPoint,
    c: &WeightedPoint,
    d: &WeightedPoint,
) -> Option<bool> {
    let (center, power_value) = power_center(a, b, c)?;
    let dist = d.power_distance(center);
    Some(dist <= power_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_fully_inside_is_unchanged() {
        let seg = clip_segment_to_rect(
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(0.0, 0.0),
            Point::new(5.0, 5.0),
        )
        .unwrap();
        assert_eq!(seg.source, Point::new(1.0, 1.0));
        assert_eq!(seg.target, Point::new(2.0, 2.0));
    }

    #[test]
    fn clip_fully_outside_is_none() {
        let seg = clip_segment_to_rect(
            Point::new(10.0, 10.0),
            Point::new(20.0, 20.0),
            Point::new(0.0, 0.0),
            Point::new(5.0, 5.0),
        );
        assert!(seg.is_none());
    }

    #[test]
    fn clip_crossing_boundary_truncates() {
        let seg = clip_segment_to_rect(
            Point::new(-1.0, 2.0),
            Point::new(3.0, 2.0),
            Point::new(0.0, 0.0),
            Point::new(5.0, 5.0),
        )
        .unwrap();
        assert_eq!(seg.source, Point::new(0.0, 2.0));
        assert_eq!(seg.target, Point::new(3.0, 2.0));
    }

    #[test]
    fn power_center_reduces_to_circumcenter_when_unweighted() {
        let a = WeightedPoint::new(Point::new(0.0, 0.0), 0.0);
        let b = WeightedPoint::new(Point::new(2.0, 0.0), 0.0);
        let c = WeightedPoint::new(Point::new(0.0, 2.0), 0.0);
        let (center, _) = power_center(&a, &b, &c).unwrap();
        assert!((center.x - 1.0).abs() < 1e-9);
        assert!((center.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn in_power_circle_matches_unweighted_incircle() {
        let a = WeightedPoint::new(Point::new(0.0, 0.0), 0.0);
        let b = WeightedPoint::new(Point::new(4.0, 0.0), 0.0);
        let c = WeightedPoint::new(Point::new(0.0, 4.0), 0.0);
        let inside = WeightedPoint::new(Point::new(1.0, 1.0), 0.0);
        let outside = WeightedPoint::new(Point::new(10.0, 10.0), 0.0);
        assert_eq!(in_power_circle(&a, &b, &c, &inside), Some(true));
        assert_eq!(in_power_circle(&a, &b, &c, &outside), Some(false));
    }
}
