//!
//! Adjacency queries: the visible-site adjacency graph and per-edge mass
//! matrices (raw and row-normalized), read directly off the triangulation
//! and the closed-form dual-edge integrator (components B and D).
//!

use crate::energy::edge_masses;
use crate::geometry::SiteIndex;
use crate::triangulation::RegularTriangulation;

/// Flat list of `(i, j)` visible-site pairs, both directions, one entry per
/// directed incident edge.
pub fn get_adjacence_graph(tri: &RegularTriangulation) -> Vec<(SiteIndex, SiteIndex)> {
    let mut pairs = Vec::new();
    for id in tri.visible_sites() {
        for edge in tri.incident_edges(id) {
            pairs.push((id, tri.other(edge, id)));
        }
    }
    pairs
}

/// The unnormalized `n×n` mass matrix: `N[i][j] = m_ij` for adjacent
/// visible sites, `0` otherwise.
pub fn get_neighbor_val(
    tri: &RegularTriangulation,
    mu_x: f64,
    mu_y: f64,
    sigma_x: f64,
    sigma_y: f64,
    max_value: f64,
) -> Vec<Vec<f64>> {
    let n = tri.len();
    let mut matrix = vec![vec![0.0; n]; n];
    let masses = edge_masses(tri, mu_x, mu_y, sigma_x, sigma_y, max_value);
    for id in tri.visible_sites() {
        for edge in tri.incident_edges(id) {
            let other = tri.other(edge, id);
            let mass = masses.get(&edge).copied().unwrap_or(0.0);
            matrix[id as usize][other as usize] = mass;
        }
    }
    matrix
}

/// The row-stochastic `n×n` proportion matrix: each visible site's row
/// sums to 1 (hidden sites, or visible sites with zero total incident
/// mass, get an all-zero row).
pub fn get_neighbor_proportion(
    tri: &RegularTriangulation,
    mu_x: f64,
    mu_y: f64,
    sigma_x: f64,
    sigma_y: f64,
    max_value: f64,
) -> Vec<Vec<f64>> {
    let mut matrix = get_neighbor_val(tri, mu_x, mu_y, sigma_x, sigma_y, max_value);
    for row in matrix.iter_mut() {
        let total: f64 = row.iter().sum();
        if total > 0.0 {
            for v in row.iter_mut() {
                *v /= total;
            }
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::geometry::Point;
    use crate::triangulation::Vertex;

    fn two_site_triangulation() -> (RegularTriangulation, Domain) {
        let mut domain = Domain::new();
        domain.set(16.0, 16.0, 1e6, 1e6, 32, 32, 1.0).unwrap();
        let vertices = vec![
            Vertex { id: 0, position: Point::new(8.0, 16.0), weight: 0.0 },
            Vertex { id: 1, position: Point::new(24.0, 16.0), weight: 0.0 },
        ];
        let tri = RegularTriangulation::build(vertices, domain.min_corner(), domain.max_corner()).unwrap();
        (tri, domain)
    }

    #[test]
    fn adjacency_graph_lists_both_directions() {
        let (tri, _domain) = two_site_triangulation();
        let pairs = get_adjacence_graph(&tri);
        assert!(pairs.contains(&(0, 1)));
        assert!(pairs.contains(&(1, 0)));
    }

    #[test]
    fn neighbor_val_is_symmetric() {
        let (tri, domain) = two_site_triangulation();
        let matrix = get_neighbor_val(&tri, domain.mu_x(), domain.mu_y(), domain.sigma_x(), domain.sigma_y(), domain.max_value());
        assert!((matrix[0][1] - matrix[1][0]).abs() < 1e-9);
    }

    #[test]
    fn neighbor_proportion_rows_are_stochastic() {
        let (tri, domain) = two_site_triangulation();
        let matrix = get_neighbor_proportion(&tri, domain.mu_x(), domain.mu_y(), domain.sigma_x(), domain.sigma_y(), domain.max_value());
        for row in &matrix {
            let sum: f64 = row.iter().sum();
            assert!(sum < 1e-9 || (sum - 1.0).abs() < 1e-9);
        }
    }
}
