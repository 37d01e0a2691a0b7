//! Closed-form solvers for `infracal`.
//!
//! Currently a normalized-DLT perspective-n-point solver and its RANSAC
//! wrapper, both working on undistorted normalized image coordinates.

pub mod math;
pub mod pnp;

pub use pnp::*;
