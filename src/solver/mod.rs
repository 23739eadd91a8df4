//!
//! Sparse weighted graph Laplacian and its Conjugate Gradient solve, used by
//! Newton's method on weights. Adjacency-list (CSR-like) sparse storage
//! rather than `nalgebra`'s dense `DMatrix`: the Laplacian's degree is the
//! number of Delaunay neighbors, not `n`, so a dense solve would be
//! asymptotically wrong for this problem. `nalgebra::DVector` still carries
//! the dense iterate vectors, matching the teacher's one linear-algebra
//! dependency.
//!

pub mod error;

pub use error::SolverError;

use crate::geometry::{Edge, SiteIndex};
use crate::triangulation::RegularTriangulation;
use nalgebra::DVector;
use std::collections::HashMap;

/// A sparse symmetric matrix stored as one adjacency list per row, plus an
/// explicit diagonal.
pub struct SparseMatrix {
    off_diagonal: Vec<Vec<(usize, f64)>>,
    diagonal: Vec<f64>,
}

impl SparseMatrix {
    pub fn dim(&self) -> usize {
        self.diagonal.len()
    }

    fn matvec(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut y = DVector::from_iterator(
            self.dim(),
            self.diagonal.iter().zip(x.iter()).map(|(d, xi)| d * xi),
        );
        for (row, neighbors) in self.off_diagonal.iter().enumerate() {
            for &(col, weight) in neighbors {
                y[row] += weight * x[col];
            }
        }
        y
    }
}

/// Builds the weighted graph Laplacian of the visible-site adjacency:
/// `A_ij = −scale · |e*_ij| / ‖x_i − x_j‖` off-diagonal, diagonal = minus
/// row sum. `indices` compacts visible site ids to dense matrix rows
/// `[0, m)`. Row 0 is pinned (gauge fix for the Laplacian's 1-D nullspace,
/// the constant vector) by zeroing its off-diagonal and setting its
/// diagonal to 1.
pub fn build_laplacian(
    tri: &RegularTriangulation,
    masses: &HashMap<Edge, f64>,
    indices: &HashMap<SiteIndex, usize>,
) -> SparseMatrix {
    let m = indices.len();
    let mut off_diagonal: Vec<Vec<(usize, f64)>> = vec![Vec::new(); m];
    let mut diagonal = vec![0.0_f64; m];
    let mut seen = std::collections::HashSet::new();

    for &id in indices.keys() {
        for edge in tri.incident_edges(id) {
            if !seen.insert(edge) {
                continue;
            }
            let other = tri.other(edge, id);
            let (Some(&row), Some(&col)) = (indices.get(&id), indices.get(&other)) else {
                continue;
            };
            let mass = masses.get(&edge).copied().unwrap_or(0.0);
            if mass <= 0.0 {
                continue;
            }
            let dist = (tri.vertex(id).position - tri.vertex(other).position).norm();
            if dist < 1e-12 {
                continue;
            }
            let weight = -mass / dist;
            off_diagonal[row].push((col, weight));
            off_diagonal[col].push((row, weight));
            diagonal[row] -= weight;
            diagonal[col] -= weight;
        }
    }

    if m > 0 {
        off_diagonal[0].clear();
        diagonal[0] = 1.0;
        for row in off_diagonal.iter_mut().skip(1) {
            row.retain(|&(col, _)| col != 0);
        }
    }

    SparseMatrix { off_diagonal, diagonal }
}

/// Solves `A·x = b` via Conjugate Gradient with a Jacobi (diagonal)
/// preconditioner, to `≤ tolerance` relative residual. `b[0]` is expected
/// to already reflect the gauge fix (the caller zeroes it alongside the
/// pinned row in `build_laplacian`).
pub fn solve(matrix: &SparseMatrix, b: &DVector<f64>, tolerance: f64, max_iters: usize) -> Result<DVector<f64>, SolverError> {
    let n = matrix.dim();
    if n == 0 {
        return Err(SolverError::EmptySystem);
    }

    let b_norm = b.norm().max(1e-300);
    let mut x = DVector::zeros(n);
    let mut r = b - matrix.matvec(&x);
    let precondition = |v: &DVector<f64>| -> DVector<f64> {
        DVector::from_iterator(n, v.iter().zip(matrix.diagonal.iter()).map(|(vi, di)| vi / di.max(1e-300)))
    };
    let mut z = precondition(&r);
    let mut p = z.clone();
    let mut rz_old = r.dot(&z);

    let mut residual = r.norm() / b_norm;
    for _ in 0..max_iters {
        if residual <= tolerance {
            return Ok(x);
        }
        let ap = matrix.matvec(&p);
        let alpha = rz_old / p.dot(&ap).max(1e-300);
        x += alpha * &p;
        r -= alpha * &ap;
        residual = r.norm() / b_norm;
        if residual <= tolerance {
            return Ok(x);
        }
        z = precondition(&r);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz_old.max(1e-300);
        p = &z + beta * &p;
        rz_old = rz_new;
    }

    Err(SolverError::Divergence { tolerance, max_iters, reached: residual })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cg_solves_a_tiny_diagonal_system_exactly() {
        let matrix = SparseMatrix {
            off_diagonal: vec![Vec::new(), Vec::new()],
            diagonal: vec![2.0, 4.0],
        };
        let b = DVector::from_vec(vec![4.0, 8.0]);
        let x = solve(&matrix, &b, 1e-12, 100).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-9);
        assert!((x[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn cg_solves_a_small_connected_laplacian() {
        // Path graph 0 - 1 - 2, unit edge weights, gauge-fixed at row 0
        // (row 0's off-diagonal to 1 removed, diagonal forced to 1).
        let matrix = SparseMatrix {
            off_diagonal: vec![vec![], vec![(2, -1.0)], vec![(1, -1.0)]],
            diagonal: vec![1.0, 2.0, 1.0],
        };
        let b = DVector::from_vec(vec![0.0, 1.0, -1.0]);
        let x = solve(&matrix, &b, 1e-10, 200).unwrap();
        assert!((x[0] - 0.0).abs() < 1e-6);
        assert!((x[1] - 0.0).abs() < 1e-6);
        assert!((x[2] - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn empty_system_is_rejected() {
        let matrix = SparseMatrix { off_diagonal: vec![], diagonal: vec![] };
        let b = DVector::from_vec(vec![]);
        assert!(matches!(solve(&matrix, &b, 1e-10, 10), Err(SolverError::EmptySystem)));
    }
}
