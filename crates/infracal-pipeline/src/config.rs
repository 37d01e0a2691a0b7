//! Calibration configuration.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Options for the joint refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineOptions {
    /// Iteration budget handed to the solver.
    pub max_iters: usize,
    /// Scale of the Cauchy loss, in pixels.
    pub cauchy_scale: f64,
    /// Treat scene points as free parameters in `run()`.
    pub optimize_scene_points: bool,
    pub verbosity: usize,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            max_iters: 1000,
            cauchy_scale: 1.0,
            optimize_scene_points: false,
            verbosity: 0,
        }
    }
}

/// Constants of the calibration, fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfrastructureConfig {
    /// Lowe ratio threshold for descriptor matching.
    pub max_distance_ratio: f64,
    /// Minimum number of 2D-2D matches against a candidate frame.
    pub min_correspondences_2d2d: usize,
    /// Minimum number of 2D-3D correspondences and PnP inliers.
    pub min_correspondences_2d3d: usize,
    /// Minimum camera displacement between committed frame sets.
    pub min_keyframe_distance: f64,
    /// Number of reference frames retrieved per image.
    pub nearest_image_matches: usize,
    /// Focal length used to scale the pixel threshold to normalized units.
    pub nominal_focal_length: f64,
    /// PnP inlier threshold in pixels.
    pub reproj_error_thresh: f64,
    pub pnp_max_iterations: usize,
    pub refine: RefineOptions,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            max_distance_ratio: 0.7,
            min_correspondences_2d2d: 20,
            min_correspondences_2d3d: 25,
            min_keyframe_distance: 0.3,
            nearest_image_matches: 10,
            nominal_focal_length: 300.0,
            reproj_error_thresh: 2.0,
            pnp_max_iterations: 200,
            refine: RefineOptions::default(),
        }
    }
}

impl InfrastructureConfig {
    /// PnP inlier threshold in normalized image units.
    pub fn scaled_reproj_thresh(&self) -> f64 {
        self.reproj_error_thresh / self.nominal_focal_length
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_distance_ratio > 0.0 && self.max_distance_ratio <= 1.0,
            "max_distance_ratio must be in (0, 1], got {}",
            self.max_distance_ratio
        );
        ensure!(
            self.min_correspondences_2d2d > 0,
            "min_correspondences_2d2d must be non-zero"
        );
        ensure!(
            self.min_correspondences_2d3d > 0,
            "min_correspondences_2d3d must be non-zero"
        );
        ensure!(
            self.min_keyframe_distance >= 0.0,
            "min_keyframe_distance must be non-negative, got {}",
            self.min_keyframe_distance
        );
        ensure!(
            self.nearest_image_matches > 0,
            "nearest_image_matches must be non-zero"
        );
        ensure!(
            self.nominal_focal_length > 0.0,
            "nominal_focal_length must be positive, got {}",
            self.nominal_focal_length
        );
        ensure!(
            self.reproj_error_thresh > 0.0,
            "reproj_error_thresh must be positive, got {}",
            self.reproj_error_thresh
        );
        ensure!(self.pnp_max_iterations > 0, "pnp_max_iterations must be non-zero");
        ensure!(self.refine.max_iters > 0, "refine.max_iters must be non-zero");
        ensure!(
            self.refine.cauchy_scale > 0.0,
            "refine.cauchy_scale must be positive, got {}",
            self.refine.cauchy_scale
        );
        Ok(())
    }
}
