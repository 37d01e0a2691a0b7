//! High-level entry crate for `infracal`, infrastructure-based extrinsic
//! calibration of multi-camera rigs.
//!
//! Given a reference map of an environment (posed frames with 3D points)
//! and synchronized images from the rig, every camera is localized against
//! the map; the rig extrinsics are initialized from the best fully localized
//! frame set and refined jointly with the rig odometry.
//!
//! ```no_run
//! use infracal::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! # let cameras: Vec<PinholeCamera> = vec![];
//! # let capabilities: Capabilities = unimplemented!();
//! let mut calib = InfrastructureCalibration::new(cameras, InfrastructureConfig::default(), capabilities)?;
//! calib.load_map(std::path::Path::new("map"))?;
//! // calib.add_frame_set(&images, timestamp, true) for every image set
//! let report = calib.run()?;
//! println!("{}", report.to_json_pretty()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - **[`pipeline`]**: localization, frame-set assembly, initialization,
//!   refinement and persistence
//! - **[`core`]**: math types, camera model, data model, RANSAC
//! - **[`linear`]**: closed-form PnP
//! - **[`optim`]**: non-linear least-squares refinement
//! - **[`prelude`]**: convenient re-exports

/// Calibration workflow and its capabilities.
pub mod pipeline {
    pub use infracal_pipeline::*;
}

/// Core math types, camera model and session data model.
pub mod core {
    pub use infracal_core::*;
}

/// Closed-form pose solvers.
pub mod linear {
    pub use infracal_linear::*;
}

/// Non-linear refinement problems and backends.
pub mod optim {
    pub use infracal_optim::*;
}

/// Import with `use infracal::prelude::*;`.
pub mod prelude {
    pub use crate::core::{
        CameraIntrinsics, CameraRigExtrinsics, Descriptor, ErrorStats, Frame, FrameGraph,
        FrameSet, Iso3, Keypoint, Odometry, PinholeCamera, Pt3, Vec2, Vec3,
    };

    pub use crate::pipeline::{
        Capabilities, CalibrationReport, DescriptorMatcher, FeatureDetector,
        InfrastructureCalibration, InfrastructureConfig, PlaceRecognizer, PoseSolver,
        RefineOptions,
    };
}
