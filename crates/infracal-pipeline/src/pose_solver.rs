//! Robust camera pose solver capability.

use infracal_core::{Iso3, Pt3, Vec2};
use infracal_linear::{dlt_ransac, PnpRansacOptions};

/// Result of a robust PnP solve.
#[derive(Debug, Clone)]
pub struct PoseEstimate {
    /// Pose mapping world points into the camera.
    pub cam_se3_world: Iso3,
    /// Indices of inlier correspondences, ascending.
    pub inliers: Vec<usize>,
}

/// Robust perspective-n-point solver on normalized image coordinates.
pub trait PoseSolver: Send + Sync {
    /// `None` when no pose is consistent with enough correspondences.
    fn solve(&self, world: &[Pt3], normalized: &[Vec2], threshold: f64, max_iters: usize) -> Option<PoseEstimate>;
}

/// Normalized DLT inside RANSAC.
#[derive(Debug, Clone)]
pub struct DltRansacSolver {
    pub confidence: f64,
    pub seed: u64,
}

impl Default for DltRansacSolver {
    fn default() -> Self {
        let defaults = PnpRansacOptions::default();
        Self {
            confidence: defaults.confidence,
            seed: defaults.seed,
        }
    }
}

impl PoseSolver for DltRansacSolver {
    fn solve(&self, world: &[Pt3], normalized: &[Vec2], threshold: f64, max_iters: usize) -> Option<PoseEstimate> {
        let opts = PnpRansacOptions {
            threshold,
            max_iters,
            confidence: self.confidence,
            seed: self.seed,
        };
        match dlt_ransac(world, normalized, &opts) {
            Ok((cam_se3_world, inliers)) => Some(PoseEstimate {
                cam_se3_world,
                inliers,
            }),
            Err(err) => {
                log::debug!("pnp failed: {}", err);
                None
            }
        }
    }
}
