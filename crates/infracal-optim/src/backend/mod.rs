//! Solver backend for the refinement IR.
//!
//! The backend compiles a [`ProblemIR`] into a tiny-solver problem (manifolds,
//! fixed blocks, robust losses), runs Levenberg-Marquardt and hands back the
//! optimized blocks by name.

mod tiny_solver_backend;

use anyhow::Result;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ir::ProblemIR;

pub use tiny_solver_backend::TinySolverBackend;

/// Options forwarded to the Levenberg-Marquardt loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSolveOptions {
    /// Iteration budget, always honored.
    pub max_iters: usize,
    pub verbosity: usize,
    pub linear_solver: LinearSolverKind,
    /// Early exit once the cost drops by less than this between iterations.
    /// A rejected step leaves the cost unchanged, so any positive threshold
    /// also stops there. `None` disables the check.
    pub min_abs_decrease: Option<f64>,
    pub min_rel_decrease: Option<f64>,
    /// Stop once the squared residual norm falls below this.
    pub min_error: Option<f64>,
}

impl Default for BackendSolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 1000,
            verbosity: 0,
            linear_solver: LinearSolverKind::SparseCholesky,
            min_abs_decrease: None,
            min_rel_decrease: None,
            min_error: Some(1e-10),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearSolverKind {
    #[default]
    SparseCholesky,
    SparseQR,
}

/// Optimized blocks and the robust cost `0.5 * Σ ρ(‖r‖²)` at the solution.
#[derive(Debug, Clone)]
pub struct BackendSolution {
    pub params: HashMap<String, DVector<f64>>,
    pub final_cost: f64,
    /// Levenberg-Marquardt iterations run, rejected steps included.
    pub iterations: usize,
}

/// Compile and solve `ir` starting from `initial`.
pub trait OptimBackend {
    fn solve(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
        opts: &BackendSolveOptions,
    ) -> Result<BackendSolution>;
}
