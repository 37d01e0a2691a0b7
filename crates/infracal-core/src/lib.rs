//! Core math, camera model and data model for `infracal`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, `Iso3`, ...) and
//!   rotation helpers (Euler yaw/pitch/roll, quaternion averaging),
//! - a pinhole camera model with Brown-Conrady distortion,
//! - a generic RANSAC engine (`ransac`, [`Estimator`]),
//! - the session data model: features, frames, frame sets, frame graphs and
//!   the identity-keyed [`PointMap`],
//! - the reprojection oracle shared by initialization and refinement.
//!
//! Pose conventions:
//! - `cam_se3_world` (T_C_W) maps world points into a camera frame,
//! - `ref_se3_cam` (T_R_C) maps camera points into the reference camera frame,
//! - `world_se3_rig` (T_W_R) is the rig pose described by an [`Odometry`].

/// Rig extrinsics container.
pub mod extrinsics;
/// Linear algebra type aliases and rotation helpers.
pub mod math;
/// Camera models.
pub mod models;
/// Identity-keyed 3D point arena.
pub mod point_map;
/// Generic RANSAC engine and traits.
pub mod ransac;
/// Reprojection oracle and error aggregates.
pub mod reprojection;
/// Deterministic synthetic scenes for tests and demos.
pub mod synthetic;
/// Features, frames, frame sets and frame graphs.
pub mod types;

pub use extrinsics::*;
pub use math::*;
pub use models::*;
pub use point_map::*;
pub use ransac::*;
pub use reprojection::*;
pub use types::*;
