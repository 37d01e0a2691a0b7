//! Calibration run report.

use infracal_core::{CameraRigExtrinsics, ErrorStats};
use serde::{Deserialize, Serialize};

use crate::initializer::HypothesisScore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub frame_set_count: usize,
    /// Frame set whose relative poses seeded the extrinsics.
    pub chosen_frame_set: usize,
    /// Mean of the per-frame PnP reprojection errors before initialization.
    pub mean_pnp_error: f64,
    pub hypotheses: Vec<HypothesisScore>,
    pub initial_error: ErrorStats,
    pub refined_error: ErrorStats,
    pub final_cost: f64,
    /// Solver iterations spent in refinement.
    pub iterations: usize,
    pub extrinsics: CameraRigExtrinsics,
    pub odometry_distance: f64,
}

impl CalibrationReport {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_json_roundtrip() {
        let report = CalibrationReport {
            frame_set_count: 4,
            chosen_frame_set: 2,
            mean_pnp_error: 0.4,
            hypotheses: vec![HypothesisScore {
                frame_set: 2,
                avg_error: 0.7,
            }],
            initial_error: ErrorStats::from_errors([0.5, 1.0]),
            refined_error: ErrorStats::from_errors([0.25]),
            final_cost: 1.5,
            iterations: 37,
            extrinsics: CameraRigExtrinsics::new(3),
            odometry_distance: 12.0,
        };
        let json = report.to_json_pretty().unwrap();
        let back: CalibrationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.chosen_frame_set, 2);
        assert_eq!(back.extrinsics, report.extrinsics);
        assert_eq!(back.initial_error.count, 2);
        assert_eq!(back.iterations, 37);
        assert!((back.refined_error.avg - 0.25).abs() < 1e-12);
    }
}
