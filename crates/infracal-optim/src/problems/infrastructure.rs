//! Joint refinement of rig extrinsics, rig odometry and (optionally) scene
//! points against a fixed set of 2D-3D observations.
//!
//! Parameter blocks:
//! - `ext_rot/{cam}` (SO3 `[qx, qy, qz, qw]`) and `ext_trans/{cam}` for the
//!   extrinsic `ref_se3_cam` of each observed camera,
//! - `odo_pos/{set}` and `odo_att/{set}` (yaw, pitch, roll) for each observed
//!   frame set,
//! - `point/{idx}` for each observed point when points are optimized.
//!
//! Blocks exist only for cameras, frame sets and points referenced by at
//! least one observation. The reference camera's blocks are fixed.

use crate::backend::{BackendSolveOptions, OptimBackend, TinySolverBackend};
use crate::ir::{FactorKind, FixedMask, ManifoldKind, ParamId, ProblemIR, ResidualBlock, RobustLoss};
use crate::params::rotation::{dvec_to_quat, dvec_to_vec3, quat_to_dvec, vec3_to_dvec};
use anyhow::{ensure, Result};
use infracal_core::{Iso3, Odometry, PinholeCamera, Pt3, Vec2};
use nalgebra::DVector;
use std::collections::{BTreeSet, HashMap};

/// One pixel observation of a scene point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointObservation {
    pub camera: usize,
    /// Index into the odometry list.
    pub frame_set: usize,
    /// Index into the point list.
    pub point: usize,
    /// Observed distorted pixel.
    pub uv: Vec2,
}

#[derive(Debug, Clone)]
pub struct InfrastructureDataset {
    pub cameras: Vec<PinholeCamera>,
    pub points: Vec<Pt3>,
    pub observations: Vec<PointObservation>,
}

impl InfrastructureDataset {
    pub fn num_cameras(&self) -> usize {
        self.cameras.len()
    }

    fn validate(&self, num_frame_sets: usize) -> Result<()> {
        ensure!(!self.cameras.is_empty(), "need at least one camera");
        for (i, obs) in self.observations.iter().enumerate() {
            ensure!(
                obs.camera < self.cameras.len(),
                "observation {} references camera {} of {}",
                i,
                obs.camera,
                self.cameras.len()
            );
            ensure!(
                obs.frame_set < num_frame_sets,
                "observation {} references frame set {} of {}",
                i,
                obs.frame_set,
                num_frame_sets
            );
            ensure!(
                obs.point < self.points.len(),
                "observation {} references point {} of {}",
                i,
                obs.point,
                self.points.len()
            );
        }
        Ok(())
    }
}

/// Initial values: one extrinsic per camera, one odometry per frame set.
#[derive(Debug, Clone)]
pub struct InfrastructureInit {
    pub ref_se3_cam: Vec<Iso3>,
    pub odometry: Vec<Odometry>,
}

#[derive(Debug, Clone)]
pub struct InfrastructureSolveOptions {
    pub robust_loss: RobustLoss,
    /// Treat scene points as free parameters.
    pub optimize_points: bool,
    /// Hold the reference camera (index 0) at its initial extrinsic.
    pub fix_reference_camera: bool,
}

impl Default for InfrastructureSolveOptions {
    fn default() -> Self {
        Self {
            robust_loss: RobustLoss::Cauchy { scale: 1.0 },
            optimize_points: false,
            fix_reference_camera: true,
        }
    }
}

/// Refined values. Entries without observations keep their initial value.
#[derive(Debug, Clone)]
pub struct InfrastructureResult {
    pub ref_se3_cam: Vec<Iso3>,
    pub odometry: Vec<Odometry>,
    pub points: Vec<Pt3>,
    pub final_cost: f64,
    pub num_residuals: usize,
    /// Solver iterations; zero when nothing was observed.
    pub iterations: usize,
}

fn ext_rot_key(cam: usize) -> String {
    format!("ext_rot/{}", cam)
}

fn ext_trans_key(cam: usize) -> String {
    format!("ext_trans/{}", cam)
}

fn odo_pos_key(set: usize) -> String {
    format!("odo_pos/{}", set)
}

fn odo_att_key(set: usize) -> String {
    format!("odo_att/{}", set)
}

fn point_key(idx: usize) -> String {
    format!("point/{}", idx)
}

/// Build the IR and its initial parameter map.
pub fn build_infrastructure_ir(
    dataset: &InfrastructureDataset,
    initial: &InfrastructureInit,
    opts: &InfrastructureSolveOptions,
) -> Result<(ProblemIR, HashMap<String, DVector<f64>>)> {
    ensure!(
        initial.ref_se3_cam.len() == dataset.num_cameras(),
        "extrinsics count {} != camera count {}",
        initial.ref_se3_cam.len(),
        dataset.num_cameras()
    );
    dataset.validate(initial.odometry.len())?;

    let cameras: BTreeSet<usize> = dataset.observations.iter().map(|o| o.camera).collect();
    let sets: BTreeSet<usize> = dataset.observations.iter().map(|o| o.frame_set).collect();
    let points: BTreeSet<usize> = if opts.optimize_points {
        dataset.observations.iter().map(|o| o.point).collect()
    } else {
        BTreeSet::new()
    };

    let mut ir = ProblemIR::new();
    let mut initial_map = HashMap::new();

    let mut ext_ids: HashMap<usize, (ParamId, ParamId)> = HashMap::new();
    for &cam in &cameras {
        let fixed = opts.fix_reference_camera && cam == 0;
        let mask = |dim| {
            if fixed {
                FixedMask::all_fixed(dim)
            } else {
                FixedMask::all_free()
            }
        };
        let ext = &initial.ref_se3_cam[cam];
        let rot = ir.add_param_block(ext_rot_key(cam), 4, ManifoldKind::SO3, mask(4));
        let trans = ir.add_param_block(ext_trans_key(cam), 3, ManifoldKind::Euclidean, mask(3));
        initial_map.insert(ext_rot_key(cam), quat_to_dvec(&ext.rotation));
        initial_map.insert(ext_trans_key(cam), vec3_to_dvec(&ext.translation.vector));
        ext_ids.insert(cam, (rot, trans));
    }

    let mut odo_ids: HashMap<usize, (ParamId, ParamId)> = HashMap::new();
    for &set in &sets {
        let odo = &initial.odometry[set];
        let pos = ir.add_param_block(odo_pos_key(set), 3, ManifoldKind::Euclidean, FixedMask::all_free());
        let att = ir.add_param_block(odo_att_key(set), 3, ManifoldKind::Euclidean, FixedMask::all_free());
        initial_map.insert(odo_pos_key(set), vec3_to_dvec(&odo.position));
        initial_map.insert(odo_att_key(set), vec3_to_dvec(&odo.attitude));
        odo_ids.insert(set, (pos, att));
    }

    let mut point_ids: HashMap<usize, ParamId> = HashMap::new();
    for &idx in &points {
        let id = ir.add_param_block(point_key(idx), 3, ManifoldKind::Euclidean, FixedMask::all_free());
        initial_map.insert(point_key(idx), vec3_to_dvec(&dataset.points[idx].coords));
        point_ids.insert(idx, id);
    }

    for obs in &dataset.observations {
        let (rot, trans) = ext_ids[&obs.camera];
        let (pos, att) = odo_ids[&obs.frame_set];
        let camera = dataset.cameras[obs.camera].clone();
        let uv = [obs.uv.x, obs.uv.y];

        let (params, factor) = match point_ids.get(&obs.point) {
            Some(&point) => (
                vec![rot, trans, pos, att, point],
                FactorKind::ReprojOdometryExtrinsicsPoint { uv, w: 1.0, camera },
            ),
            None => {
                let pw = dataset.points[obs.point];
                (
                    vec![rot, trans, pos, att],
                    FactorKind::ReprojOdometryExtrinsics {
                        pw: [pw.x, pw.y, pw.z],
                        uv,
                        w: 1.0,
                        camera,
                    },
                )
            }
        };
        ir.add_residual_block(ResidualBlock {
            params,
            loss: opts.robust_loss,
            factor,
            residual_dim: 2,
        });
    }

    ir.validate()?;
    Ok((ir, initial_map))
}

/// Refine extrinsics, odometry and optionally points.
pub fn optimize_infrastructure(
    dataset: &InfrastructureDataset,
    initial: &InfrastructureInit,
    opts: &InfrastructureSolveOptions,
    backend_opts: &BackendSolveOptions,
) -> Result<InfrastructureResult> {
    let (ir, initial_map) = build_infrastructure_ir(dataset, initial, opts)?;
    let num_residuals = ir.residuals.len();

    let mut result = InfrastructureResult {
        ref_se3_cam: initial.ref_se3_cam.clone(),
        odometry: initial.odometry.clone(),
        points: dataset.points.clone(),
        final_cost: 0.0,
        num_residuals,
        iterations: 0,
    };
    if num_residuals == 0 {
        log::warn!("infrastructure refinement has no observations; keeping initial values");
        return Ok(result);
    }

    let solution = TinySolverBackend.solve(&ir, &initial_map, backend_opts)?;
    let params = &solution.params;

    for (cam, ext) in result.ref_se3_cam.iter_mut().enumerate() {
        if opts.fix_reference_camera && cam == 0 {
            continue;
        }
        let (Some(rot), Some(trans)) = (params.get(&ext_rot_key(cam)), params.get(&ext_trans_key(cam)))
        else {
            continue;
        };
        *ext = Iso3::from_parts(dvec_to_vec3(trans.as_view())?.into(), dvec_to_quat(rot.as_view())?);
    }

    for (set, odo) in result.odometry.iter_mut().enumerate() {
        let (Some(pos), Some(att)) = (params.get(&odo_pos_key(set)), params.get(&odo_att_key(set)))
        else {
            continue;
        };
        odo.position = dvec_to_vec3(pos.as_view())?;
        odo.attitude = dvec_to_vec3(att.as_view())?;
    }

    if opts.optimize_points {
        for (idx, point) in result.points.iter_mut().enumerate() {
            if let Some(v) = params.get(&point_key(idx)) {
                *point = dvec_to_vec3(v.as_view())?.into();
            }
        }
    }

    result.final_cost = solution.final_cost;
    result.iterations = solution.iterations;
    Ok(result)
}
