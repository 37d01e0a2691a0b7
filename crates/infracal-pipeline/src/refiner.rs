//! Joint refinement of extrinsics, odometry and scene points over a session.

use anyhow::Result;
use infracal_core::{
    session_error, CameraRigExtrinsics, ErrorStats, FrameSet, Odometry, PinholeCamera, PointId,
    PointMap, Vec3,
};
use infracal_optim::infrastructure::{
    optimize_infrastructure, InfrastructureDataset, InfrastructureInit, InfrastructureSolveOptions,
    PointObservation,
};
use infracal_optim::ir::RobustLoss;
use infracal_optim::BackendSolveOptions;
use serde::{Deserialize, Serialize};

use crate::config::RefineOptions;

/// Diagnostics of one refinement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineSummary {
    pub initial: ErrorStats,
    pub refined: ErrorStats,
    /// Robust cost at the solution.
    pub final_cost: f64,
    pub num_residuals: usize,
    pub iterations: usize,
}

/// Observations of every associated feature in frame sets with odometry.
fn collect_dataset(cameras: &[PinholeCamera], frame_sets: &[FrameSet], point_map: &PointMap) -> InfrastructureDataset {
    let mut observations = Vec::new();
    for (set_idx, frame_set) in frame_sets.iter().enumerate() {
        if frame_set.odometry.is_none() {
            continue;
        }
        for frame in &frame_set.frames {
            if frame.camera >= cameras.len() {
                continue;
            }
            for feature in frame.associated_features() {
                let Some(point) = feature.feature3d else {
                    continue;
                };
                if point.0 >= point_map.len() {
                    continue;
                }
                observations.push(PointObservation {
                    camera: frame.camera,
                    frame_set: set_idx,
                    point: point.0,
                    uv: feature.keypoint.pixel(),
                });
            }
        }
    }

    InfrastructureDataset {
        cameras: cameras.to_vec(),
        points: point_map.points().iter().map(|p| p.position).collect(),
        observations,
    }
}

/// Refine in place: extrinsics, the odometry of each frame set and, when
/// `optimize_scene_points` is set, the point positions.
///
/// Camera 0 stays fixed. Cameras, frame sets and points without
/// observations keep their values.
pub fn refine_session(
    cameras: &[PinholeCamera],
    frame_sets: &mut [FrameSet],
    point_map: &mut PointMap,
    extrinsics: &mut CameraRigExtrinsics,
    opts: &RefineOptions,
    optimize_scene_points: bool,
) -> Result<RefineSummary> {
    let initial = session_error(cameras, frame_sets, point_map.points(), extrinsics);
    log::info!("initial reprojection error: {}", initial);

    let dataset = collect_dataset(cameras, frame_sets, point_map);
    let init = InfrastructureInit {
        ref_se3_cam: extrinsics.ref_se3_cam.clone(),
        odometry: frame_sets
            .iter()
            .map(|s| {
                s.odometry
                    .unwrap_or_else(|| Odometry::new(s.timestamp, Vec3::zeros(), Vec3::zeros()))
            })
            .collect(),
    };
    let solve_opts = InfrastructureSolveOptions {
        robust_loss: RobustLoss::Cauchy {
            scale: opts.cauchy_scale,
        },
        optimize_points: optimize_scene_points,
        fix_reference_camera: true,
    };
    let backend_opts = BackendSolveOptions {
        max_iters: opts.max_iters,
        verbosity: opts.verbosity,
        ..Default::default()
    };

    let result = optimize_infrastructure(&dataset, &init, &solve_opts, &backend_opts)?;

    for (cam, pose) in result.ref_se3_cam.iter().enumerate().skip(1) {
        extrinsics.set(cam, *pose)?;
    }
    extrinsics.reset_reference();
    for (frame_set, odometry) in frame_sets.iter_mut().zip(&result.odometry) {
        if frame_set.odometry.is_some() {
            frame_set.odometry = Some(*odometry);
        }
    }
    if optimize_scene_points {
        for (idx, position) in result.points.iter().enumerate() {
            if let Some(point) = point_map.get_mut(PointId(idx)) {
                point.position = *position;
            }
        }
    }

    let refined = session_error(cameras, frame_sets, point_map.points(), extrinsics);
    log::info!(
        "final reprojection error: {} (cost {:.6}, {} residuals, {} iterations)",
        refined,
        result.final_cost,
        result.num_residuals,
        result.iterations
    );

    Ok(RefineSummary {
        initial,
        refined,
        final_cost: result.final_cost,
        num_residuals: result.num_residuals,
        iterations: result.iterations,
    })
}
