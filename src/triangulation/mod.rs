//!
//! Weighted Delaunay / regular triangulation, clipped to the rectangular
//! domain. Generalizes the teacher's unweighted Bowyer-Watson Delaunay
//! (`examples/blot-bot-org-core-lib/src/drawing/util/stipple.rs`) by
//! swapping the plain in-circle predicate for the weighted in-power-circle
//! predicate (`crate::geometry::in_power_circle`), and replaces its hull-ray
//! extension (for an unbounded Voronoi diagram) with direct clipping to a
//! fixed rectangle (for a power diagram bounded by the domain).
//!

pub mod error;

pub use error::TriangulationError;

use crate::geometry::{
    clip_segment_to_rect, in_power_circle, normalize_edge, power_center, Edge, Point, Segment,
    SiteIndex, WeightedPoint,
};
use std::collections::{HashMap, HashSet};

const HULL_RAY_SCALE: f64 = 4.0;
const MISSING: u32 = u32::MAX;

/// A site as seen by the triangulation: its stable index, position and
/// power-diagram weight.
#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    pub id: SiteIndex,
    pub position: Point,
    pub weight: f64,
}

pub struct RegularTriangulation {
    vertices: Vec<Vertex>,
    triangles: Vec<[u32; 3]>,
    power_centers: Vec<Point>,
    power_values: Vec<f64>,
    edge_triangles: HashMap<Edge, (u32, u32)>,
    neighbors: HashMap<SiteIndex, Vec<SiteIndex>>,
    hidden: HashSet<SiteIndex>,
    min_corner: Point,
    max_corner: Point,
}

impl RegularTriangulation {
    /// Builds the regular triangulation of `vertices`, clipped to
    /// `[min_corner, max_corner]`. Uses a weighted Bowyer-Watson
    /// restitching over a large enclosing super-triangle (weight 0,
    /// discarded at the end), exactly as the teacher's plain Delaunay
    /// does, but with the in-circle test generalized to in-power-circle.
    pub fn build(
        vertices: Vec<Vertex>,
        min_corner: Point,
        max_corner: Point,
    ) -> Result<Self, TriangulationError> {
        let n = vertices.len();
        if n == 0 {
            return Err(TriangulationError::EmptyConfiguration);
        }
        Self::reject_coincident(&vertices)?;

        let super_vertices = Self::super_triangle(&vertices, min_corner, max_corner);
        let mut all_points: Vec<WeightedPoint> = vertices
            .iter()
            .map(|v| WeightedPoint::new(v.position, v.weight))
            .collect();
        let super_base = all_points.len() as u32;
        all_points.extend(super_vertices.iter().map(|p| WeightedPoint::new(*p, 0.0)));

        let mut triangles: Vec<[u32; 3]> =
            vec![[super_base, super_base + 1, super_base + 2]];
        let mut hidden: HashSet<SiteIndex> = HashSet::new();

        for point_idx in 0..n {
            let candidate = &all_points[point_idx];
            let mut bad: Vec<usize> = Vec::new();
            for (ti, tri) in triangles.iter().enumerate() {
                let a = &all_points[tri[0] as usize];
                let b = &all_points[tri[1] as usize];
                let c = &all_points[tri[2] as usize];
                match in_power_circle(a, b, c, candidate) {
                    Some(true) => bad.push(ti),
                    Some(false) => {}
                    None => return Err(TriangulationError::Degenerate),
                }
            }

            if bad.is_empty() {
                hidden.insert(point_idx as u32);
                continue;
            }

            let mut edge_count: HashMap<Edge, u32> = HashMap::new();
            for &bi in &bad {
                let tri = triangles[bi];
                for (x, y) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                    *edge_count.entry(normalize_edge(x, y)).or_insert(0) += 1;
                }
            }
            let boundary: Vec<Edge> = edge_count
                .into_iter()
                .filter(|&(_, count)| count == 1)
                .map(|(edge, _)| edge)
                .collect();

            let mut bad_sorted = bad;
            bad_sorted.sort_unstable_by(|a, b| b.cmp(a));
            for bi in bad_sorted {
                triangles.remove(bi);
            }

            for (x, y) in boundary {
                let mut new_tri = [x, y, point_idx as u32];
                new_tri.sort_unstable();
                triangles.push(new_tri);
            }
        }

        triangles.retain(|tri| tri.iter().all(|&v| v < n as u32));

        let mut referenced: HashSet<SiteIndex> = HashSet::new();
        for tri in &triangles {
            referenced.extend(tri.iter().copied());
        }
        for id in 0..n as u32 {
            if !referenced.contains(&id) {
                hidden.insert(id);
            }
        }

        let mut edge_triangles: HashMap<Edge, (u32, u32)> = HashMap::new();
        for (ti, tri) in triangles.iter().enumerate() {
            for (x, y) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                let key = normalize_edge(x, y);
                edge_triangles
                    .entry(key)
                    .and_modify(|slot| slot.1 = ti as u32)
                    .or_insert((ti as u32, MISSING));
            }
        }

        let mut neighbors: HashMap<SiteIndex, Vec<SiteIndex>> = HashMap::new();
        for &(a, b) in edge_triangles.keys() {
            neighbors.entry(a).or_default().push(b);
            neighbors.entry(b).or_default().push(a);
        }

        let mut power_centers = Vec::with_capacity(triangles.len());
        let mut power_values = Vec::with_capacity(triangles.len());
        for tri in &triangles {
            let a = WeightedPoint::new(vertices[tri[0] as usize].position, vertices[tri[0] as usize].weight);
            let b = WeightedPoint::new(vertices[tri[1] as usize].position, vertices[tri[1] as usize].weight);
            let c = WeightedPoint::new(vertices[tri[2] as usize].position, vertices[tri[2] as usize].weight);
            let (center, value) = power_center(&a, &b, &c).ok_or(TriangulationError::Degenerate)?;
            power_centers.push(center);
            power_values.push(value);
        }

        Ok(Self {
            vertices,
            triangles,
            power_centers,
            power_values,
            edge_triangles,
            neighbors,
            hidden,
            min_corner,
            max_corner,
        })
    }

    /// Flags coincident sites up front rather than relying on the
    /// restitching loop to notice: two sites at (near-)identical positions
    /// never yield a valid power diagram (spec's "degenerate triangulation"
    /// failure mode), and detecting it by sorting is cheaper and more
    /// reliable than inferring it from a collapsed triangle fan.
    fn reject_coincident(vertices: &[Vertex]) -> Result<(), TriangulationError> {
        let mut order: Vec<usize> = (0..vertices.len()).collect();
        order.sort_by(|&a, &b| {
            vertices[a]
                .position
                .x
                .partial_cmp(&vertices[b].position.x)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    vertices[a]
                        .position
                        .y
                        .partial_cmp(&vertices[b].position.y)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
        for w in order.windows(2) {
            let (i, j) = (w[0], w[1]);
            if (vertices[i].position - vertices[j].position).norm() < 1e-9 {
                return Err(TriangulationError::Degenerate);
            }
        }
        Ok(())
    }

    fn super_triangle(vertices: &[Vertex], min_corner: Point, max_corner: Point) -> [Point; 3] {
        let mut min = min_corner;
        let mut max = max_corner;
        for v in vertices {
            min.x = min.x.min(v.position.x);
            min.y = min.y.min(v.position.y);
            max.x = max.x.max(v.position.x);
            max.y = max.y.max(v.position.y);
        }
        let center = Point::new((min.x + max.x) / 2.0, (min.y + max.y) / 2.0);
        let span = max - min;
        let radius = span.norm() * HULL_RAY_SCALE + 10.0;
        let sqrt3 = 3.0_f64.sqrt();

        [
            Point::new(center.x, center.y + 2.0 * radius),
            Point::new(center.x - sqrt3 * radius, center.y - radius),
            Point::new(center.x + sqrt3 * radius, center.y - radius),
        ]
    }

    pub fn is_hidden(&self, id: SiteIndex) -> bool {
        self.hidden.contains(&id)
    }

    pub fn visible_sites(&self) -> impl Iterator<Item = SiteIndex> + '_ {
        (0..self.vertices.len() as u32).filter(|id| !self.is_hidden(*id))
    }

    /// Incident edges of `id`, each normalized `(min, max)`.
    pub fn incident_edges(&self, id: SiteIndex) -> Vec<Edge> {
        match self.neighbors.get(&id) {
            Some(ns) => ns.iter().map(|&n| normalize_edge(id, n)).collect(),
            None => Vec::new(),
        }
    }

    /// True when the bounded dual of `edge` lies (at least partially)
    /// inside the domain rectangle.
    pub fn is_inside(&self, edge: Edge) -> bool {
        self.build_bounded_dual_edge(edge).is_some()
    }

    /// The other endpoint of `edge`, given one of its vertices.
    pub fn other(&self, edge: Edge, from: SiteIndex) -> SiteIndex {
        if edge.0 == from { edge.1 } else { edge.0 }
    }

    /// The dual edge of `edge`, clipped to the domain rectangle. `None` if
    /// it does not intersect the domain at all.
    pub fn build_bounded_dual_edge(&self, edge: Edge) -> Option<Segment> {
        let (t0, t1) = *self.edge_triangles.get(&edge)?;
        let c0 = self.power_centers[t0 as usize];

        let c1 = if t1 != MISSING {
            self.power_centers[t1 as usize]
        } else {
            self.hull_ray_endpoint(edge, t0, c0)
        };

        clip_segment_to_rect(c0, c1, self.min_corner, self.max_corner)
    }

    fn hull_ray_endpoint(&self, edge: Edge, t0: u32, center: Point) -> Point {
        let a = self.vertices[edge.0 as usize].position;
        let b = self.vertices[edge.1 as usize].position;
        let mid = Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);

        let mut direction = mid - center;
        if direction.norm() < 1e-12 {
            let along = b - a;
            direction = nalgebra::Vector2::new(-along.y, along.x);
        }
        let diag = (self.max_corner - self.min_corner).norm();
        let direction = direction.normalize() * diag.max(1.0) * HULL_RAY_SCALE;
        let _ = t0;
        center + direction
    }

    /// Ordered (not necessarily exactly closed at domain corners) list of
    /// bounded dual-edge endpoints forming `id`'s cell polygon, sorted CCW
    /// around the site's position.
    pub fn cell_polygon(&self, id: SiteIndex) -> Vec<Point> {
        if self.is_hidden(id) {
            return Vec::new();
        }
        let center = self.vertices[id as usize].position;
        let mut points: Vec<Point> = Vec::new();
        for edge in self.incident_edges(id) {
            if let Some(seg) = self.build_bounded_dual_edge(edge) {
                points.push(seg.source);
                points.push(seg.target);
            }
        }
        points.sort_by(|p, q| {
            let ap = (p.y - center.y).atan2(p.x - center.x);
            let aq = (q.y - center.y).atan2(q.x - center.x);
            ap.partial_cmp(&aq).unwrap_or(std::cmp::Ordering::Equal)
        });
        points.dedup_by(|a, b| (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9);
        points
    }

    pub fn vertex(&self, id: SiteIndex) -> &Vertex {
        &self.vertices[id as usize]
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn min_corner(&self) -> Point {
        self.min_corner
    }

    pub fn max_corner(&self) -> Point {
        self.max_corner
    }

    /// Locates the site that owns continuous point `p`: the visible site
    /// minimizing power distance `‖p − x_i‖² − w_i`.
    pub fn locate(&self, p: Point) -> Option<SiteIndex> {
        self.visible_sites()
            .min_by(|&a, &b| {
                let da = self.vertices[a as usize].position_power_distance(p);
                let db = self.vertices[b as usize].position_power_distance(p);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

impl Vertex {
    fn position_power_distance(&self, p: Point) -> f64 {
        (self.position - p).norm_squared() - self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_domain() -> (Point, Point) {
        (Point::new(0.0, 0.0), Point::new(10.0, 10.0))
    }

    #[test]
    fn single_site_has_no_hidden_or_edges() {
        let (min, max) = square_domain();
        let vertices = vec![Vertex { id: 0, position: Point::new(5.0, 5.0), weight: 0.0 }];
        let t = RegularTriangulation::build(vertices, min, max).unwrap();
        assert!(!t.is_hidden(0));
        assert!(t.incident_edges(0).is_empty());
    }

    #[test]
    fn three_sites_form_one_triangle_and_all_visible() {
        let (min, max) = square_domain();
        let vertices = vec![
            Vertex { id: 0, position: Point::new(2.0, 2.0), weight: 0.0 },
            Vertex { id: 1, position: Point::new(8.0, 2.0), weight: 0.0 },
            Vertex { id: 2, position: Point::new(5.0, 8.0), weight: 0.0 },
        ];
        let t = RegularTriangulation::build(vertices, min, max).unwrap();
        for id in 0..3 {
            assert!(!t.is_hidden(id));
            assert_eq!(t.incident_edges(id).len(), 2);
        }
    }

    #[test]
    fn grid_sites_are_mutually_visible() {
        let (min, max) = (Point::new(0.0, 0.0), Point::new(4.0, 4.0));
        let mut vertices = Vec::new();
        let mut id = 0;
        for j in 0..3 {
            for i in 0..3 {
                vertices.push(Vertex {
                    id,
                    position: Point::new(1.0 + i as f64, 1.0 + j as f64),
                    weight: 0.0,
                });
                id += 1;
            }
        }
        let t = RegularTriangulation::build(vertices, min, max).unwrap();
        assert_eq!(t.visible_sites().count(), 9);
    }

    #[test]
    fn a_dominant_weight_hides_its_neighbor() {
        let (min, max) = square_domain();
        let vertices = vec![
            Vertex { id: 0, position: Point::new(5.0, 5.0), weight: 1.0e9 },
            Vertex { id: 1, position: Point::new(5.1, 5.0), weight: 0.0 },
            Vertex { id: 2, position: Point::new(1.0, 1.0), weight: 0.0 },
            Vertex { id: 3, position: Point::new(9.0, 9.0), weight: 0.0 },
        ];
        let t = RegularTriangulation::build(vertices, min, max).unwrap();
        assert!(t.is_hidden(1));
        assert!(!t.is_hidden(0));
    }

    #[test]
    fn locate_picks_nearest_visible_site() {
        let (min, max) = square_domain();
        let vertices = vec![
            Vertex { id: 0, position: Point::new(2.0, 2.0), weight: 0.0 },
            Vertex { id: 1, position: Point::new(8.0, 8.0), weight: 0.0 },
        ];
        let t = RegularTriangulation::build(vertices, min, max).unwrap();
        assert_eq!(t.locate(Point::new(1.0, 1.0)), Some(0));
        assert_eq!(t.locate(Point::new(9.0, 9.0)), Some(1));
    }

    #[test]
    fn coincident_sites_are_degenerate() {
        let (min, max) = square_domain();
        let vertices = vec![
            Vertex { id: 0, position: Point::new(5.0, 5.0), weight: 0.0 },
            Vertex { id: 1, position: Point::new(5.0, 5.0), weight: 0.0 },
            Vertex { id: 2, position: Point::new(2.0, 8.0), weight: 0.0 },
        ];
        let result = RegularTriangulation::build(vertices, min, max);
        assert!(result.is_err());
    }
}
