//! Reprojection residual through rig odometry and camera extrinsics.
//!
//! The camera pose is composed from the extrinsic (`ref_se3_cam`) and the rig
//! odometry (position, yaw/pitch/roll) with
//! [`infracal_core::cam_se3_world_generic`], and the point is projected with
//! [`PinholeCamera::project_generic`]. Error reports in the core use the same
//! two routines.

use infracal_core::{cam_se3_world_generic, PinholeCamera};
use nalgebra::{DVector, DVectorView, Quaternion, RealField, SVector, UnitQuaternion, Vector3};

fn vec3_generic<T: RealField>(v: DVectorView<'_, T>) -> Vector3<T> {
    Vector3::new(v[0].clone(), v[1].clone(), v[2].clone())
}

fn quat_generic<T: RealField>(q: DVectorView<'_, T>) -> UnitQuaternion<T> {
    UnitQuaternion::from_quaternion(Quaternion::new(
        q[3].clone(),
        q[0].clone(),
        q[1].clone(),
        q[2].clone(),
    ))
}

/// Residual `sqrt(w) * (project(T_C_W * p_w) - uv)` in pixels.
///
/// - `ext_rot`: `[qx, qy, qz, qw]` of `ref_se3_cam`,
/// - `ext_trans`: translation of `ref_se3_cam`,
/// - `odo_pos`, `odo_att`: rig position and `(yaw, pitch, roll)`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn odometry_reproj_residual_generic<T: RealField>(
    ext_rot: DVectorView<'_, T>,
    ext_trans: DVectorView<'_, T>,
    odo_pos: DVectorView<'_, T>,
    odo_att: DVectorView<'_, T>,
    pw: Vector3<T>,
    camera: &PinholeCamera,
    uv: [f64; 2],
    w: f64,
) -> SVector<T, 2> {
    debug_assert!(ext_rot.len() == 4, "extrinsic rotation must have 4 params");
    debug_assert!(ext_trans.len() == 3, "extrinsic translation must have 3 params");
    debug_assert!(odo_pos.len() == 3, "odometry position must have 3 params");
    debug_assert!(odo_att.len() == 3, "odometry attitude must have 3 params");

    let (q_cw, t_cw) = cam_se3_world_generic(
        &quat_generic(ext_rot),
        &vec3_generic(ext_trans),
        &vec3_generic(odo_pos),
        &vec3_generic(odo_att),
    );
    let pc = q_cw.transform_vector(&pw) + t_cw;
    let proj = camera.project_generic(&pc);

    let sqrt_w = T::from_f64(w.sqrt()).unwrap();
    let ru = (proj.x.clone() - T::from_f64(uv[0]).unwrap()) * sqrt_w.clone();
    let rv = (proj.y.clone() - T::from_f64(uv[1]).unwrap()) * sqrt_w;
    SVector::<T, 2>::new(ru, rv)
}

/// `f64` evaluation of the residual for a fixed world point.
pub fn odometry_reproj_residual(
    ext_rot: &DVector<f64>,
    ext_trans: &DVector<f64>,
    odo_pos: &DVector<f64>,
    odo_att: &DVector<f64>,
    pw: [f64; 3],
    camera: &PinholeCamera,
    uv: [f64; 2],
) -> SVector<f64, 2> {
    odometry_reproj_residual_generic(
        ext_rot.as_view(),
        ext_trans.as_view(),
        odo_pos.as_view(),
        odo_att.as_view(),
        Vector3::new(pw[0], pw[1], pw[2]),
        camera,
        uv,
        1.0,
    )
}

/// Lift a constant point into the scalar type.
pub(crate) fn const_point<T: RealField>(pw: [f64; 3]) -> Vector3<T> {
    Vector3::new(
        T::from_f64(pw[0]).unwrap(),
        T::from_f64(pw[1]).unwrap(),
        T::from_f64(pw[2]).unwrap(),
    )
}

/// Point parameter block as a vector.
pub(crate) fn point_param<T: RealField>(p: DVectorView<'_, T>) -> Vector3<T> {
    vec3_generic(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::rotation::{quat_to_dvec, vec3_to_dvec};
    use infracal_core::{reprojection_error, CameraIntrinsics, Iso3, Odometry, Pt3, Vec2, Vec3};

    #[test]
    fn residual_norm_matches_reprojection_oracle() {
        let camera = PinholeCamera::new(CameraIntrinsics {
            fx: 310.0,
            fy: 305.0,
            cx: 320.0,
            cy: 240.0,
            skew: 0.0,
        });
        let ext = Iso3::new(Vec3::new(0.3, 0.1, -0.2), Vec3::new(0.05, 0.6, 0.0));
        let odo = Odometry::new(0, Vec3::new(1.0, -2.0, 0.5), Vec3::new(0.4, -0.1, 0.03));
        let pw = odo
            .cam_se3_world(&ext)
            .inverse_transform_point(&Pt3::new(0.4, -0.3, 6.0));
        let uv = Vec2::new(350.0, 200.0);

        let r = odometry_reproj_residual(
            &quat_to_dvec(&ext.rotation),
            &vec3_to_dvec(&ext.translation.vector),
            &vec3_to_dvec(&odo.position),
            &vec3_to_dvec(&odo.attitude),
            [pw.x, pw.y, pw.z],
            &camera,
            [uv.x, uv.y],
        );
        let expected = reprojection_error(&camera, &pw, &ext, &odo, &uv);
        assert!((r.norm() - expected).abs() < 1e-9, "{} vs {}", r.norm(), expected);
    }
}
