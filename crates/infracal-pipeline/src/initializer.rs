//! Extrinsics initialization by relative-pose voting over complete frame
//! sets.
//!
//! Every complete frame set proposes extrinsics `ref_se3_cam[j] =
//! cam_se3_world[0] * cam_se3_world[j]^-1`. Each proposal is scored by
//! re-deriving the odometry of every frame set and measuring the
//! whole-session reprojection error; the lowest error wins (first on ties).

use anyhow::{bail, Result};
use infracal_core::{
    quaternion_average, session_error, CameraRigExtrinsics, ErrorStats, FrameSet, Iso3, Odometry,
    PinholeCamera, Point3DFeature, Vec3,
};
use serde::{Deserialize, Serialize};

/// Extrinsics proposed by one complete frame set.
pub fn extrinsics_from_frame_set(frame_set: &FrameSet, camera_count: usize) -> Option<CameraRigExtrinsics> {
    if !frame_set.is_complete(camera_count) {
        return None;
    }
    let reference = frame_set.frame(0)?.cam_se3_world?;
    let mut extrinsics = CameraRigExtrinsics::new(camera_count);
    for cam in 1..camera_count {
        let cam_se3_world = frame_set.frame(cam)?.cam_se3_world?;
        extrinsics.ref_se3_cam[cam] = reference * cam_se3_world.inverse();
    }
    Some(extrinsics)
}

/// Rig odometry of a frame set under `extrinsics`.
///
/// Each localized camera yields a rig pose `cam_se3_world^-1 *
/// ref_se3_cam^-1`; positions are averaged arithmetically and rotations
/// with [`quaternion_average`]. The timestamp is the first frame's.
pub fn estimate_odometry(frame_set: &FrameSet, extrinsics: &CameraRigExtrinsics) -> Option<Odometry> {
    let rig_poses: Vec<Iso3> = frame_set
        .frames
        .iter()
        .filter_map(|frame| {
            let cam_se3_world = frame.cam_se3_world?;
            let ref_se3_cam = extrinsics.get(frame.camera)?;
            Some(cam_se3_world.inverse() * ref_se3_cam.inverse())
        })
        .collect();
    if rig_poses.is_empty() {
        return None;
    }

    let position = rig_poses
        .iter()
        .fold(Vec3::zeros(), |acc, p| acc + p.translation.vector)
        / rig_poses.len() as f64;
    let rotations: Vec<_> = rig_poses.iter().map(|p| p.rotation).collect();
    let rotation = quaternion_average(&rotations)?;

    let timestamp = frame_set
        .frames
        .first()
        .map_or(frame_set.timestamp, |f| f.timestamp);
    Some(Odometry::from_world_se3_rig(
        timestamp,
        &Iso3::from_parts(position.into(), rotation),
    ))
}

/// Recompute the odometry of every frame set.
pub fn assign_odometry(frame_sets: &mut [FrameSet], extrinsics: &CameraRigExtrinsics) {
    for frame_set in frame_sets.iter_mut() {
        frame_set.odometry = estimate_odometry(frame_set, extrinsics);
    }
}

/// Score of one evaluated hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HypothesisScore {
    pub frame_set: usize,
    pub avg_error: f64,
}

/// Selected starting point for refinement.
#[derive(Debug, Clone)]
pub struct Initialization {
    pub extrinsics: CameraRigExtrinsics,
    /// Index of the winning frame set.
    pub frame_set: usize,
    /// Session error under the winning hypothesis.
    pub error: ErrorStats,
    /// Every evaluated hypothesis, in frame-set order.
    pub hypotheses: Vec<HypothesisScore>,
}

/// Choose the extrinsics hypothesis with the lowest session error and seed
/// every frame set's odometry with it.
///
/// Fails if no frame set localizes all cameras.
pub fn initialize_extrinsics(
    cameras: &[PinholeCamera],
    frame_sets: &mut [FrameSet],
    points: &[Point3DFeature],
) -> Result<Initialization> {
    let camera_count = cameras.len();
    let mut best: Option<(usize, CameraRigExtrinsics, ErrorStats)> = None;
    let mut hypotheses = Vec::new();

    for idx in 0..frame_sets.len() {
        let Some(extrinsics) = extrinsics_from_frame_set(&frame_sets[idx], camera_count) else {
            continue;
        };
        assign_odometry(frame_sets, &extrinsics);
        let error = session_error(cameras, frame_sets, points, &extrinsics);
        log::debug!("hypothesis from frame set {}: {}", idx, error);

        hypotheses.push(HypothesisScore {
            frame_set: idx,
            avg_error: error.avg,
        });
        if best.as_ref().map_or(true, |(_, _, b)| error.avg < b.avg) {
            best = Some((idx, extrinsics, error));
        }
    }

    let Some((frame_set, extrinsics, error)) = best else {
        bail!(
            "no complete frame set among {} (need all {} cameras localized)",
            frame_sets.len(),
            camera_count
        );
    };

    assign_odometry(frame_sets, &extrinsics);
    log::info!(
        "initial extrinsics from frame set {} of {} ({} candidates): {}",
        frame_set,
        frame_sets.len(),
        hypotheses.len(),
        error
    );

    Ok(Initialization {
        extrinsics,
        frame_set,
        error,
        hypotheses,
    })
}
