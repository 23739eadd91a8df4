//!
//! Thin, shape-validating wrappers around the capacity vector and
//! neighbor-proportion matrix, so "dense indices `[0,n)`" and "row-
//! stochastic target" have one place to be checked instead of being
//! re-verified at every call site that touches a bare `Vec`.
//!

use crate::error::CcvtError;

#[derive(Debug, Clone)]
pub struct CapacityVector(Vec<f64>);

impl CapacityVector {
    /// Validates non-negativity; shape (length `n`) is checked by the
    /// caller against the current site count, since this type alone
    /// doesn't know `n`.
    pub fn new(values: Vec<f64>) -> Result<Self, CcvtError> {
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(CcvtError::InvalidConfig(
                "capacity vector must contain only finite, non-negative values".into(),
            ));
        }
        Ok(Self(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Uniform capacities: `total / n` per site.
    pub fn uniform(n: usize, total: f64) -> Self {
        Self(vec![total / n.max(1) as f64; n])
    }
}

#[derive(Debug, Clone)]
pub struct NeighborProportionMatrix(Vec<Vec<f64>>);

impl NeighborProportionMatrix {
    /// Validates squareness and that no row exceeds 1 in total mass (rows
    /// need not sum to exactly 1 — a site with fewer neighbors than the
    /// matrix models simply leaves the remainder unconstrained).
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self, CcvtError> {
        let n = rows.len();
        for row in &rows {
            if row.len() != n {
                return Err(CcvtError::InvalidConfig(
                    "neighbor proportion matrix must be square".into(),
                ));
            }
            if row.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(CcvtError::InvalidConfig(
                    "neighbor proportion matrix must contain only finite, non-negative values".into(),
                ));
            }
        }
        Ok(Self(rows))
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.0
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_vector_rejects_negative_values() {
        assert!(CapacityVector::new(vec![1.0, -0.5]).is_err());
    }

    #[test]
    fn neighbor_matrix_rejects_non_square_rows() {
        assert!(NeighborProportionMatrix::new(vec![vec![0.0, 1.0], vec![1.0]]).is_err());
    }

    #[test]
    fn uniform_capacities_split_total_evenly() {
        let c = CapacityVector::uniform(4, 100.0);
        assert_eq!(c.as_slice(), &[25.0, 25.0, 25.0, 25.0]);
    }
}
