//! Camera models.
//!
//! The calibration core treats cameras as immutable, externally calibrated
//! models. [`PinholeCamera`] provides the operations the pipeline needs:
//! projection, undistortion, projective lifting and reprojection error.

mod camera;

pub use camera::*;
