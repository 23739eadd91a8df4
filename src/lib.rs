//!
//! Capacity-Constrained Centroidal Voronoi Tessellation with Neighborhood
//! control (CCVT-N): site positions and power-diagram weights over a
//! rectangular Gaussian-density domain, optimized so cell capacities match
//! a target vector and dual-edge adjacency mass matches a target
//! neighbor-proportion matrix.
//!

pub mod adjacency;
pub mod ccvt;
pub mod domain;
pub mod energy;
pub mod eps;
pub mod error;
pub mod geometry;
pub mod integrate;
pub mod optimizer;
pub mod pixels;
pub mod rng;
pub mod solver;
pub mod triangulation;
pub mod types;

pub use ccvt::Ccvt;
pub use error::CcvtError;
