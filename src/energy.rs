//!
//! WCVT energy and the three gradients the optimizer drives to zero: the
//! weight gradient (area vs. capacity), the position gradient (Lloyd
//! displacement), and the neighbor-proportion-matching gradient.
//!

use crate::geometry::{Point, SiteIndex};
use crate::integrate::dual_edge_mass;
use crate::pixels::PixelAssignment;
use crate::triangulation::RegularTriangulation;
use rayon::prelude::*;

/// `E(x, w) = Σ_i ∫_{cell_i} ρ·‖y − x_i‖² dy − Σ_i w_i·(area_i − C_i)`.
pub fn wcvt_energy(tri: &RegularTriangulation, assignment: &PixelAssignment, capacities: &[f64]) -> f64 {
    let dispersion: f64 = tri
        .visible_sites()
        .map(|id| assignment.dispersion[id as usize])
        .sum();
    let capacity_term: f64 = tri
        .visible_sites()
        .map(|id| {
            let i = id as usize;
            tri.vertex(id).weight * (assignment.areas[i] - capacities[i])
        })
        .sum();
    dispersion - capacity_term
}

/// `∂E/∂w_i = C_i − area_i`, zero for hidden sites.
pub fn weight_gradient(tri: &RegularTriangulation, assignment: &PixelAssignment, capacities: &[f64]) -> Vec<f64> {
    (0..tri.len())
        .map(|i| {
            if tri.is_hidden(i as SiteIndex) {
                0.0
            } else {
                capacities[i] - assignment.areas[i]
            }
        })
        .collect()
}

/// `∂E/∂x_i = 2·area_i·(x_i − centroid_i)`, the Lloyd displacement scaled
/// by cell mass. `rayon` parallelizes the per-site computation since each
/// site only reads its own area/centroid.
pub fn position_gradient(tri: &RegularTriangulation, assignment: &PixelAssignment) -> Vec<(f64, f64)> {
    (0..tri.len())
        .into_par_iter()
        .map(|i| {
            let id = i as SiteIndex;
            if tri.is_hidden(id) {
                return (0.0, 0.0);
            }
            let area = assignment.areas[i];
            let pos = tri.vertex(id).position;
            let (cx, cy) = assignment.centroids[i];
            (2.0 * area * (pos.x - cx), 2.0 * area * (pos.y - cy))
        })
        .collect()
}

/// The density-weighted centroid of each visible cell, for Lloyd's update
/// (`x_i ← centroid_i`). Hidden sites keep their current position.
pub fn lloyd_targets(tri: &RegularTriangulation, assignment: &PixelAssignment) -> Vec<Point> {
    (0..tri.len())
        .map(|i| {
            let id = i as SiteIndex;
            if tri.is_hidden(id) || assignment.areas[i] <= 0.0 {
                tri.vertex(id).position
            } else {
                let (cx, cy) = assignment.centroids[i];
                Point::new(cx, cy)
            }
        })
        .collect()
}

/// Raw, unnormalized dual-edge masses `m_ij` for every incident edge of
/// every visible site, grounded directly on the closed-form integrator
/// (component D) rather than the pixel rasterization (component C uses a
/// supersampled approximation; the edge mass has an exact closed form and
/// should use it).
pub fn edge_masses(
    tri: &RegularTriangulation,
    mu_x: f64,
    mu_y: f64,
    sigma_x: f64,
    sigma_y: f64,
    max_value: f64,
) -> std::collections::HashMap<crate::geometry::Edge, f64> {
    let mut masses = std::collections::HashMap::new();
    let mut seen = std::collections::HashSet::new();
    for id in tri.visible_sites() {
        for edge in tri.incident_edges(id) {
            if !seen.insert(edge) {
                continue;
            }
            if let Some(seg) = tri.build_bounded_dual_edge(edge) {
                let c_k = seg.source;
                let direction = seg.target - seg.source;
                let (a, b) = (direction.x, direction.y);
                let mu_1 = c_k.x - mu_x;
                let mu_2 = c_k.y - mu_y;
                let mass = dual_edge_mass(seg.length(), a, b, mu_1, mu_2, sigma_x, sigma_y, max_value);
                masses.insert(edge, mass.max(0.0));
            }
        }
    }
    masses
}

/// Neighbor-proportion gradient, by central finite differences on each
/// visible site's own two coordinates (the Open Question in spec §9,
/// resolved in favor of finite differences): perturbing `x_i` only changes
/// `i`'s own incident dual edges to first order, so only those need
/// re-integration per perturbation, not a full triangulation rebuild.
pub fn neighbor_gradient(
    tri: &RegularTriangulation,
    target: &[Vec<f64>],
    mu_x: f64,
    mu_y: f64,
    sigma_x: f64,
    sigma_y: f64,
    max_value: f64,
    h: f64,
) -> Vec<(f64, f64)> {
    let n = tri.len();
    let masses = edge_masses(tri, mu_x, mu_y, sigma_x, sigma_y, max_value);
    let loss = |m: &std::collections::HashMap<crate::geometry::Edge, f64>| -> f64 {
        let mut total = 0.0;
        for i in tri.visible_sites() {
            let edges = tri.incident_edges(i);
            let row_total: f64 = edges.iter().map(|e| *m.get(e).unwrap_or(&0.0)).sum();
            if row_total <= 0.0 {
                continue;
            }
            for edge in &edges {
                let j = tri.other(*edge, i);
                let p_ij = m.get(edge).copied().unwrap_or(0.0) / row_total;
                let target_ij = target[i as usize][j as usize];
                total += 0.5 * (p_ij - target_ij).powi(2);
            }
        }
        total
    };

    (0..n)
        .map(|idx| {
            let id = idx as SiteIndex;
            if tri.is_hidden(id) {
                return (0.0, 0.0);
            }
            let base = tri.vertex(id).position;

            let grad_axis = |dx: f64, dy: f64| -> f64 {
                let mut vertices: Vec<_> = (0..n)
                    .map(|k| *tri.vertex(k as SiteIndex))
                    .collect();
                vertices[idx].position = Point::new(base.x + dx, base.y + dy);
                let plus = match RegularTriangulation::build(vertices.clone(), tri.min_corner(), tri.max_corner()) {
                    Ok(t) => loss(&edge_masses(&t, mu_x, mu_y, sigma_x, sigma_y, max_value)),
                    Err(_) => loss(&masses),
                };
                vertices[idx].position = Point::new(base.x - dx, base.y - dy);
                let minus = match RegularTriangulation::build(vertices, tri.min_corner(), tri.max_corner()) {
                    Ok(t) => loss(&edge_masses(&t, mu_x, mu_y, sigma_x, sigma_y, max_value)),
                    Err(_) => loss(&masses),
                };
                (plus - minus) / (2.0 * (dx.abs() + dy.abs()).max(h))
            };

            let gx = grad_axis(h, 0.0);
            let gy = grad_axis(0.0, h);
            (gx, gy)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::pixels::assign_pixels;
    use crate::triangulation::Vertex;

    fn uniform_domain() -> Domain {
        let mut d = Domain::new();
        d.set(16.0, 16.0, 1e6, 1e6, 32, 32, 1.0).unwrap();
        d
    }

    #[test]
    fn weight_gradient_is_zero_at_matching_capacity() {
        let domain = uniform_domain();
        let vertices = vec![Vertex { id: 0, position: Point::new(16.0, 16.0), weight: 0.0 }];
        let tri = RegularTriangulation::build(vertices, domain.min_corner(), domain.max_corner()).unwrap();
        let assignment = assign_pixels(&tri, &domain);
        let capacities = vec![assignment.areas[0]];
        let grad = weight_gradient(&tri, &assignment, &capacities);
        assert!(grad[0].abs() < 1e-6);
    }

    #[test]
    fn position_gradient_vanishes_at_centroid() {
        let domain = uniform_domain();
        let vertices = vec![Vertex { id: 0, position: Point::new(16.0, 16.0), weight: 0.0 }];
        let tri = RegularTriangulation::build(vertices, domain.min_corner(), domain.max_corner()).unwrap();
        let assignment = assign_pixels(&tri, &domain);
        let grad = position_gradient(&tri, &assignment);
        assert!(grad[0].0.abs() < 1e-6);
        assert!(grad[0].1.abs() < 1e-6);
    }

    #[test]
    fn edge_masses_are_symmetric_by_construction() {
        let domain = uniform_domain();
        let vertices = vec![
            Vertex { id: 0, position: Point::new(8.0, 16.0), weight: 0.0 },
            Vertex { id: 1, position: Point::new(24.0, 16.0), weight: 0.0 },
        ];
        let tri = RegularTriangulation::build(vertices, domain.min_corner(), domain.max_corner()).unwrap();
        let masses = edge_masses(&tri, domain.mu_x(), domain.mu_y(), domain.sigma_x(), domain.sigma_y(), domain.max_value());
        assert_eq!(masses.len(), 1);
        assert!(masses.values().next().unwrap() >= &0.0);
    }
}
