use nalgebra::{RealField, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::{Iso3, Pt3, Real, Vec2, Vec3};

/// Depth clamp used by [`PinholeCamera::project_generic`].
pub const PROJECTION_EPS: f64 = 1.0e-12;

/// Pinhole intrinsics.
///
/// The corresponding calibration matrix `K` has the form:
///
/// ```text
/// [ fx  skew  cx ]
/// [  0   fy   cy ]
/// [  0    0    1 ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub skew: f64,
}

/// Radial–tangential distortion models supported by [`PinholeCamera`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RadialTangential {
    /// Classic Brown–Conrady 5-parameter model.
    BrownConrady {
        k1: f64,
        k2: f64,
        p1: f64,
        p2: f64,
        k3: f64,
    },
}

/// Pinhole camera model with optional radial–tangential distortion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub intrinsics: CameraIntrinsics,
    #[serde(default)]
    pub distortion: Option<RadialTangential>,
}

impl PinholeCamera {
    /// Camera without lens distortion.
    pub fn new(intrinsics: CameraIntrinsics) -> Self {
        Self {
            intrinsics,
            distortion: None,
        }
    }

    /// Camera with Brown–Conrady distortion.
    pub fn with_distortion(intrinsics: CameraIntrinsics, distortion: RadialTangential) -> Self {
        Self {
            intrinsics,
            distortion: Some(distortion),
        }
    }

    /// Project a camera-frame point to distorted pixel coordinates.
    ///
    /// Generic over the scalar so that the optimizer evaluates exactly the
    /// same projection as the error reports. Depth is clamped to
    /// [`PROJECTION_EPS`] so points on or behind the image plane still map to
    /// a finite (large) pixel position.
    pub fn project_generic<T: RealField>(&self, p_c: &Vector3<T>) -> Vector2<T> {
        let eps = T::from_f64(PROJECTION_EPS).unwrap();
        let z = if p_c.z.clone() > eps.clone() {
            p_c.z.clone()
        } else {
            eps
        };
        let x = p_c.x.clone() / z.clone();
        let y = p_c.y.clone() / z;

        let (x_d, y_d) = match self.distortion {
            Some(RadialTangential::BrownConrady { k1, k2, p1, p2, k3 }) => {
                distort_brown_conrady_generic(
                    x,
                    y,
                    T::from_f64(k1).unwrap(),
                    T::from_f64(k2).unwrap(),
                    T::from_f64(k3).unwrap(),
                    T::from_f64(p1).unwrap(),
                    T::from_f64(p2).unwrap(),
                )
            }
            None => (x, y),
        };

        let k = &self.intrinsics;
        let fx = T::from_f64(k.fx).unwrap();
        let fy = T::from_f64(k.fy).unwrap();
        let cx = T::from_f64(k.cx).unwrap();
        let cy = T::from_f64(k.cy).unwrap();
        let skew = T::from_f64(k.skew).unwrap();

        let u = fx * x_d.clone() + skew * y_d.clone() + cx;
        let v = fy * y_d + cy;
        Vector2::new(u, v)
    }

    /// Project a camera-frame point to distorted pixel coordinates.
    pub fn project(&self, p_c: &Pt3) -> Vec2 {
        self.project_generic(&p_c.coords)
    }

    /// Lift a distorted pixel to an undistorted projective ray `(x, y, 1)`.
    ///
    /// Returns `None` if the focal lengths are degenerate.
    pub fn lift_projective(&self, uv: &Vec2) -> Option<Vec3> {
        let k = &self.intrinsics;
        if k.fx.abs() < Real::EPSILON || k.fy.abs() < Real::EPSILON {
            return None;
        }

        let y_d = (uv.y - k.cy) / k.fy;
        let x_d = (uv.x - k.cx - k.skew * y_d) / k.fx;

        let (x_u, y_u) = match self.distortion {
            Some(model) => undistort_normalised(model, x_d, y_d),
            None => (x_d, y_d),
        };
        Some(Vec3::new(x_u, y_u, 1.0))
    }

    /// Undistort a pixel, keeping the same calibration matrix.
    pub fn undistort(&self, uv: &Vec2) -> Option<Vec2> {
        let ray = self.lift_projective(uv)?;
        let k = &self.intrinsics;
        Some(Vec2::new(
            k.fx * ray.x + k.skew * ray.y + k.cx,
            k.fy * ray.y + k.cy,
        ))
    }

    /// Pixel distance between the projection of `p_w` and `observed`.
    ///
    /// `cam_se3_world` maps world points into this camera's frame.
    pub fn reprojection_error(&self, p_w: &Pt3, cam_se3_world: &Iso3, observed: &Vec2) -> f64 {
        let p_c = cam_se3_world.transform_point(p_w);
        (self.project(&p_c) - observed).norm()
    }
}

/// Apply Brown–Conrady distortion to normalized coordinates.
pub fn distort_brown_conrady_generic<T: RealField>(
    x: T,
    y: T,
    k1: T,
    k2: T,
    k3: T,
    p1: T,
    p2: T,
) -> (T, T) {
    let r2 = x.clone() * x.clone() + y.clone() * y.clone();
    let r4 = r2.clone() * r2.clone();
    let r6 = r4.clone() * r2.clone();

    let radial = T::one() + k1 * r2.clone() + k2 * r4 + k3 * r6;

    let two = T::one() + T::one();
    let x2 = x.clone() * x.clone();
    let y2 = y.clone() * y.clone();
    let xy = x.clone() * y.clone();

    let x_tan =
        two.clone() * p1.clone() * xy.clone() + p2.clone() * (r2.clone() + two.clone() * x2);
    let y_tan = p1 * (r2 + two.clone() * y2) + two * p2 * xy;

    (x * radial.clone() + x_tan, y * radial + y_tan)
}

fn undistort_normalised(model: RadialTangential, x_d: Real, y_d: Real) -> (Real, Real) {
    match model {
        RadialTangential::BrownConrady { k1, k2, p1, p2, k3 } => {
            let mut x_u = x_d;
            let mut y_u = y_d;
            let max_iters = 10;
            let tol = 1e-12;

            for _ in 0..max_iters {
                let r2 = x_u * x_u + y_u * y_u;
                let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
                let x_t = 2.0 * p1 * x_u * y_u + p2 * (r2 + 2.0 * x_u * x_u);
                let y_t = p1 * (r2 + 2.0 * y_u * y_u) + 2.0 * p2 * x_u * y_u;

                let x_u_new = (x_d - x_t) / radial;
                let y_u_new = (y_d - y_t) / radial;

                let step = (x_u_new - x_u).abs().max((y_u_new - y_u).abs());
                x_u = x_u_new;
                y_u = y_u_new;
                if step < tol {
                    break;
                }
            }

            (x_u, y_u)
        }
    }
}
