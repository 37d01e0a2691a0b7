//! Mathematical utilities and type definitions.
//!
//! Type aliases plus the rotation conventions shared by the initializer,
//! the reprojection oracle and the optimizer factor.

use nalgebra::{Isometry3, Matrix3, Matrix4, Point3, Vector2, Vector3};

pub mod rotation;

pub use rotation::{
    cam_se3_world_generic, quaternion_average, rig_se3_world_rotation_generic,
    rotation_from_ypr, ypr_from_rotation,
};

/// Scalar type used throughout the library (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 4×4 matrix with [`Real`] entries.
pub type Mat4 = Matrix4<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;
