//! Infrastructure-based extrinsic calibration of multi-camera rigs.
//!
//! A prebuilt reference map (posed frames plus 3D points) is used to
//! localize every camera of the rig independently. Synchronized frame sets
//! whose cameras localize are collected, the rig extrinsics are initialized
//! from the best complete set and finally refined jointly with the per-set
//! rig odometry.
//!
//! ```no_run
//! use infracal_pipeline::{Capabilities, InfrastructureCalibration, InfrastructureConfig};
//! # fn main() -> anyhow::Result<()> {
//! # let cameras = unimplemented!();
//! # let capabilities: Capabilities = unimplemented!();
//! # let images: Vec<image::GrayImage> = unimplemented!();
//!
//! let mut calib = InfrastructureCalibration::new(cameras, InfrastructureConfig::default(), capabilities)?;
//! calib.load_map(std::path::Path::new("map"))?;
//! calib.add_frame_set(&images, 1000, true);
//! let report = calib.run()?;
//! println!("{}", report.to_json_pretty()?);
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod calibration;
pub mod config;
pub mod estimator;
pub mod features;
pub mod initializer;
pub mod odometry;
pub mod pose_solver;
pub mod preprocess;
pub mod recognition;
pub mod refiner;
pub mod report;
pub mod session_log;
pub mod store;

pub use crate::assembler::{collect_frame_set, keyframe_gate, localize_cameras, GateDecision};
pub use crate::calibration::{InfrastructureCalibration, REFERENCE_MAP_FILE};
pub use crate::config::{InfrastructureConfig, RefineOptions};
pub use crate::estimator::{Capabilities, FramePoseEstimator};
pub use crate::features::{
    match_features, BruteForceMatcher, DescriptorMatch, DescriptorMatcher, FeatureDetector,
};
pub use crate::initializer::{initialize_extrinsics, HypothesisScore, Initialization};
pub use crate::odometry::OdometryDistance;
pub use crate::pose_solver::{DltRansacSolver, PoseEstimate, PoseSolver};
pub use crate::recognition::{DescriptorIndexRecognizer, PlaceRecognizer};
pub use crate::refiner::{refine_session, RefineSummary};
pub use crate::report::CalibrationReport;
pub use crate::session_log::{LogEntry, Operation};
pub use crate::store::GraphIoError;
