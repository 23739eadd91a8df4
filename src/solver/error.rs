use thiserror::Error;

///
/// Errors from the sparse Laplacian solve.
///
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("conjugate gradient failed to reach relative residual {tolerance:e} within {max_iters} iterations (reached {reached:e})")]
    Divergence { tolerance: f64, max_iters: usize, reached: f64 },

    #[error("cannot solve a system with no visible sites")]
    EmptySystem,
}
