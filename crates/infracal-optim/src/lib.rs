//! Non-linear refinement for `infracal`, built on tiny-solver.
//!
//! Problems are first described in a backend-independent IR ([`ir`]) and
//! then compiled by a backend adapter ([`backend`]). Residual models in
//! [`factors`] are generic over the scalar type so the same code serves
//! `f64` evaluation and automatic differentiation.

pub mod backend;
pub mod factors;
pub mod ir;
pub mod params;
pub mod problems;

pub use crate::backend::{BackendSolveOptions, LinearSolverKind};
pub use crate::problems::infrastructure;
