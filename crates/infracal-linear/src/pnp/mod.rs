//! Perspective-n-Point pose estimation.
//!
//! Image points are undistorted normalized coordinates (`K = I`), so the
//! solvers are independent of the camera model. All solvers return
//! `T_C_W`: the transform from world coordinates into the camera frame.

use thiserror::Error;

mod dlt;
mod ransac;

pub use dlt::dlt;
pub use ransac::{dlt_ransac, normalized_residual, PnpRansacOptions};

/// Minimum correspondences for the linear solve.
pub const PNP_MIN_POINTS: usize = 6;

#[derive(Debug, Error)]
pub enum PnpError {
    #[error("need at least {PNP_MIN_POINTS} point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("world and image point counts differ: {0} vs {1}")]
    LengthMismatch(usize, usize),
    #[error("degenerate 3d point configuration")]
    DegeneratePoints,
    #[error("svd failed in PnP DLT")]
    SvdFailed,
    #[error("ransac failed to find a consensus PnP solution")]
    RansacFailed,
}
