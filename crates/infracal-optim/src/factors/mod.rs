//! Residual models with automatic differentiation support.
//!
//! Residual functions are generic over [`nalgebra::RealField`] so the
//! backend can evaluate them with `f64` and with dual numbers. They follow a
//! common pattern:
//!
//! - parameters arrive as `DVectorView<'_, T>` in the factor's layout order,
//! - constants are lifted with `T::from_f64(..).unwrap()`,
//! - the residual is returned as an `SVector`.

pub mod odometry_reprojection;
