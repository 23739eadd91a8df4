//!
//! Crate-level error type aggregating every module's `thiserror` enum,
//! matching the teacher's one-`error.rs`-per-module-plus-transparent-
//! aggregate convention (`client/error.rs`, `plugin/error.rs`,
//! `instruction/error.rs`).
//!

use crate::domain::DomainError;
use crate::solver::SolverError;
use crate::triangulation::TriangulationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CcvtError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Triangulation(#[from] TriangulationError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("optimizer failed after {retries} wstep retries: {source}")]
    OptimizerFailed { retries: u32, source: SolverError },
}
