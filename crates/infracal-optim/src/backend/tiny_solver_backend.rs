use crate::backend::{BackendSolution, BackendSolveOptions, LinearSolverKind, OptimBackend};
use crate::factors::odometry_reprojection::{
    const_point, odometry_reproj_residual_generic, point_param,
};
use crate::ir::{FactorKind, ManifoldKind, ProblemIR, ResidualBlock, RobustLoss};
use anyhow::{anyhow, bail, ensure, Result};
use infracal_core::PinholeCamera;
use nalgebra::DVector;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tiny_solver::factors::Factor;
use tiny_solver::loss_functions::{CauchyLoss, HuberLoss, Loss};
use tiny_solver::manifold::so3::QuaternionManifold;
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;
use tiny_solver::{linear::sparse::LinearSolverType, LevenbergMarquardtOptimizer};

/// tiny-solver backend adapter.
#[derive(Debug, Clone, Copy)]
pub struct TinySolverBackend;

impl TinySolverBackend {
    fn compile(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
        jacobian_passes: &Arc<AtomicUsize>,
    ) -> Result<Problem> {
        ir.validate()?;

        let mut problem = Problem::new();

        for param in &ir.params {
            let init = initial.get(&param.name).ok_or_else(|| {
                anyhow!(
                    "initial values missing parameter {} (id {:?})",
                    param.name,
                    param.id
                )
            })?;
            ensure!(
                init.len() == param.dim,
                "initial dimension mismatch for {}: expected {}, got {}",
                param.name,
                param.dim,
                init.len()
            );

            match param.manifold {
                ManifoldKind::Euclidean => {}
                ManifoldKind::SO3 => {
                    if param.fixed.is_empty() {
                        problem.set_variable_manifold(&param.name, Arc::new(QuaternionManifold));
                    } else if !param.fixed.is_all_fixed(param.dim) {
                        bail!("tiny-solver cannot partially fix SO3 manifold {}", param.name);
                    }
                }
            }

            for idx in param.fixed.iter() {
                problem.fix_variable(&param.name, idx);
            }
        }

        for (idx, residual) in ir.residuals.iter().enumerate() {
            // One block is enough: every iteration linearizes all of them once.
            let counter = (idx == 0).then_some(jacobian_passes);
            let (factor, loss) = compile_factor(residual, counter)?;
            let param_refs: Vec<&str> = residual
                .params
                .iter()
                .map(|id| ir.params[id.0].name.as_str())
                .collect();
            problem.add_residual_block(residual.residual_dim, &param_refs, factor, loss);
        }

        Ok(problem)
    }
}

impl OptimBackend for TinySolverBackend {
    fn solve(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
        opts: &BackendSolveOptions,
    ) -> Result<BackendSolution> {
        let jacobian_passes = Arc::new(AtomicUsize::new(0));
        let problem = self.compile(ir, initial, &jacobian_passes)?;
        log::debug!(
            "tiny-solver: {} parameter blocks, {} residual blocks",
            ir.params.len(),
            ir.residuals.len()
        );

        let optimizer = LevenbergMarquardtOptimizer::default();
        let solution = optimizer
            .optimize(&problem, initial, Some(to_optimizer_options(opts)))
            .ok_or_else(|| anyhow!("tiny-solver failed to converge"))?;

        let param_blocks = problem.initialize_parameter_blocks(&solution);
        let residuals = problem.compute_residuals(&param_blocks, true);
        let final_cost = 0.5 * residuals.as_ref().squared_norm_l2();
        let iterations = jacobian_passes.load(Ordering::Relaxed);
        log::debug!("tiny-solver: {} iterations, final cost {:.3e}", iterations, final_cost);

        Ok(BackendSolution {
            params: solution,
            final_cost,
            iterations,
        })
    }
}

fn to_optimizer_options(opts: &BackendSolveOptions) -> OptimizerOptions {
    let mut options = OptimizerOptions {
        max_iteration: opts.max_iters,
        verbosity_level: opts.verbosity,
        ..OptimizerOptions::default()
    };
    options.linear_solver_type = match opts.linear_solver {
        LinearSolverKind::SparseCholesky => LinearSolverType::SparseCholesky,
        LinearSolverKind::SparseQR => LinearSolverType::SparseQR,
    };
    options.min_abs_error_decrease_threshold = opts.min_abs_decrease.unwrap_or(0.0);
    options.min_rel_error_decrease_threshold = opts.min_rel_decrease.unwrap_or(0.0);
    if let Some(v) = opts.min_error {
        options.min_error_threshold = v;
    }
    options
}

fn compile_loss(loss: RobustLoss) -> Result<Option<Box<dyn Loss + Send>>> {
    match loss {
        RobustLoss::None => Ok(None),
        RobustLoss::Huber { scale } => {
            ensure!(scale > 0.0, "Huber scale must be positive");
            Ok(Some(Box::new(HuberLoss::new(scale))))
        }
        RobustLoss::Cauchy { scale } => {
            ensure!(scale > 0.0, "Cauchy scale must be positive");
            Ok(Some(Box::new(CauchyLoss::new(scale))))
        }
    }
}

type CompiledFactor = (
    Box<dyn tiny_solver::factors::FactorImpl + Send>,
    Option<Box<dyn Loss + Send>>,
);

/// Counts evaluations on dual numbers, i.e. Jacobian passes.
struct Counted<F> {
    inner: F,
    passes: Arc<AtomicUsize>,
}

impl<T: nalgebra::RealField, F: Factor<T>> Factor<T> for Counted<F> {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        if TypeId::of::<T>() != TypeId::of::<f64>() {
            self.passes.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.residual_func(params)
    }
}

fn boxed<F>(factor: F, counter: Option<&Arc<AtomicUsize>>) -> Box<dyn tiny_solver::factors::FactorImpl + Send>
where
    F: tiny_solver::factors::FactorImpl + Send + 'static,
    Counted<F>: tiny_solver::factors::FactorImpl,
{
    match counter {
        Some(passes) => Box::new(Counted {
            inner: factor,
            passes: Arc::clone(passes),
        }),
        None => Box::new(factor),
    }
}

fn compile_factor(
    residual: &ResidualBlock,
    counter: Option<&Arc<AtomicUsize>>,
) -> Result<CompiledFactor> {
    let loss = compile_loss(residual.loss)?;
    match &residual.factor {
        FactorKind::ReprojOdometryExtrinsics { pw, uv, w, camera } => {
            let factor = TinyOdometryReprojFactor {
                pw: *pw,
                uv: *uv,
                w: *w,
                camera: camera.clone(),
            };
            Ok((boxed(factor, counter), loss))
        }
        FactorKind::ReprojOdometryExtrinsicsPoint { uv, w, camera } => {
            let factor = TinyOdometryReprojPointFactor {
                uv: *uv,
                w: *w,
                camera: camera.clone(),
            };
            Ok((boxed(factor, counter), loss))
        }
    }
}

#[derive(Debug, Clone)]
struct TinyOdometryReprojFactor {
    pw: [f64; 3],
    uv: [f64; 2],
    w: f64,
    camera: PinholeCamera,
}

impl<T: nalgebra::RealField> Factor<T> for TinyOdometryReprojFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(
            params.len(),
            4,
            "expected [ext_rot, ext_trans, odo_pos, odo_att] parameter blocks"
        );
        let r = odometry_reproj_residual_generic(
            params[0].as_view(),
            params[1].as_view(),
            params[2].as_view(),
            params[3].as_view(),
            const_point(self.pw),
            &self.camera,
            self.uv,
            self.w,
        );
        DVector::from_row_slice(r.as_slice())
    }
}

#[derive(Debug, Clone)]
struct TinyOdometryReprojPointFactor {
    uv: [f64; 2],
    w: f64,
    camera: PinholeCamera,
}

impl<T: nalgebra::RealField> Factor<T> for TinyOdometryReprojPointFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(
            params.len(),
            5,
            "expected [ext_rot, ext_trans, odo_pos, odo_att, point] parameter blocks"
        );
        let r = odometry_reproj_residual_generic(
            params[0].as_view(),
            params[1].as_view(),
            params[2].as_view(),
            params[3].as_view(),
            point_param(params[4].as_view()),
            &self.camera,
            self.uv,
            self.w,
        );
        DVector::from_row_slice(r.as_slice())
    }
}
