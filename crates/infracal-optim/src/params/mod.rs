//! Parameter block conversions between core types and solver vectors.
//!
//! - [`rotation::quat_to_dvec`] / [`rotation::dvec_to_quat`]: unit quaternion as `[qx, qy, qz, qw]`
//! - [`rotation::vec3_to_dvec`] / [`rotation::dvec_to_vec3`]: 3-vectors (translations, positions,
//!   attitudes, points)

pub mod rotation;
