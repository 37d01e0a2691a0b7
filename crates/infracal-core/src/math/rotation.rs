//! Rotation conventions for rig odometry and extrinsics.
//!
//! Odometry attitude is stored as `(yaw, pitch, roll)` with the rig-to-world
//! rotation `R_W_R = Rz(yaw) * Ry(pitch) * Rx(roll)`. The generic helpers in
//! this module are evaluated both with `f64` (initialization, error
//! reporting) and with dual numbers (optimizer residuals), so the two paths
//! share exactly the same composition.

use nalgebra::{Matrix4, Quaternion, RealField, SymmetricEigen, UnitQuaternion, Vector3};

use crate::{Mat3, Real, Vec3};

/// World-to-rig rotation `R_R_W` for attitude `(yaw, pitch, roll)`.
///
/// Built as `qx⁻¹ * qy⁻¹ * qz⁻¹`, i.e. the inverse of the intrinsic
/// z-then-y-then-x rotation.
pub fn rig_se3_world_rotation_generic<T: RealField>(yaw: T, pitch: T, roll: T) -> UnitQuaternion<T> {
    let half = T::from_f64(0.5).unwrap();
    let zero = T::zero();

    let yaw_h = yaw * half.clone();
    let pitch_h = pitch * half.clone();
    let roll_h = roll * half;

    let q_z_inv = Quaternion::new(yaw_h.clone().cos(), zero.clone(), zero.clone(), -yaw_h.sin());
    let q_y_inv = Quaternion::new(
        pitch_h.clone().cos(),
        zero.clone(),
        -pitch_h.sin(),
        zero.clone(),
    );
    let q_x_inv = Quaternion::new(roll_h.clone().cos(), -roll_h.sin(), zero.clone(), zero);

    UnitQuaternion::new_unchecked(q_x_inv * q_y_inv * q_z_inv)
}

/// Camera pose `cam_se3_world` for a rig camera.
///
/// - `ext_rot`, `ext_trans`: the camera extrinsic `ref_se3_cam`,
/// - `position`, `attitude`: the rig odometry (`attitude = [yaw, pitch, roll]`).
///
/// Returns `(R_C_W, t_C_W)` such that `p_c = R_C_W * p_w + t_C_W`.
pub fn cam_se3_world_generic<T: RealField>(
    ext_rot: &UnitQuaternion<T>,
    ext_trans: &Vector3<T>,
    position: &Vector3<T>,
    attitude: &Vector3<T>,
) -> (UnitQuaternion<T>, Vector3<T>) {
    let q_rig_world = rig_se3_world_rotation_generic(
        attitude[0].clone(),
        attitude[1].clone(),
        attitude[2].clone(),
    );
    let q_cam_rig = ext_rot.inverse();
    let q_cam_world = q_cam_rig.clone() * q_rig_world;

    let t_cam_world =
        -q_cam_world.transform_vector(position) - q_cam_rig.transform_vector(ext_trans);
    (q_cam_world, t_cam_world)
}

/// Rig-to-world rotation for attitude `(yaw, pitch, roll)`.
pub fn rotation_from_ypr(ypr: &Vec3) -> UnitQuaternion<Real> {
    rig_se3_world_rotation_generic(ypr[0], ypr[1], ypr[2]).inverse()
}

/// Decompose `R = Rz(yaw) * Ry(pitch) * Rx(roll)` into `(yaw, pitch, roll)`.
pub fn ypr_from_rotation(r: &Mat3) -> Vec3 {
    let roll = r[(2, 1)].atan2(r[(2, 2)]);
    let pitch = (-r[(2, 0)]).atan2((r[(2, 1)] * r[(2, 1)] + r[(2, 2)] * r[(2, 2)]).sqrt());
    let yaw = r[(1, 0)].atan2(r[(0, 0)]);
    Vec3::new(yaw, pitch, roll)
}

/// Average a set of rotations.
///
/// Returns the dominant eigenvector of the mean outer product `mean(q q^T)`,
/// which is independent of input order and of the sign of each quaternion.
/// The result is canonicalized to `w >= 0`. Returns `None` for an empty input.
pub fn quaternion_average(rotations: &[UnitQuaternion<Real>]) -> Option<UnitQuaternion<Real>> {
    if rotations.is_empty() {
        return None;
    }

    let mut m = Matrix4::<Real>::zeros();
    for q in rotations {
        let v = q.quaternion().coords;
        m += v * v.transpose();
    }
    m /= rotations.len() as Real;

    let eig = SymmetricEigen::new(m);
    let (best, _) = eig
        .eigenvalues
        .iter()
        .enumerate()
        .fold((0, Real::NEG_INFINITY), |acc, (i, &val)| {
            if val > acc.1 {
                (i, val)
            } else {
                acc
            }
        });

    let mut v = eig.eigenvectors.column(best).into_owned();
    if v[3] < 0.0 {
        v = -v;
    }
    Some(UnitQuaternion::from_quaternion(Quaternion::from_vector(v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn angle_between(a: &UnitQuaternion<Real>, b: &UnitQuaternion<Real>) -> Real {
        a.angle_to(b)
    }

    #[test]
    fn ypr_roundtrip() {
        let ypr = Vec3::new(0.7, -0.3, 0.2);
        let q = rotation_from_ypr(&ypr);
        let back = ypr_from_rotation(q.to_rotation_matrix().matrix());
        assert!((back - ypr).norm() < 1e-12, "ypr mismatch: {:?}", back);
    }

    #[test]
    fn ypr_matches_nalgebra_euler_convention() {
        let (yaw, pitch, roll) = (-1.2, 0.4, 0.05);
        let q_expected = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
        let q = rotation_from_ypr(&Vec3::new(yaw, pitch, roll));
        assert!(angle_between(&q, &q_expected) < 1e-9);
    }

    #[test]
    fn cam_pose_matches_isometry_composition() {
        let ext = crate::Iso3::new(Vec3::new(0.5, -0.1, 0.2), Vec3::new(0.1, 0.8, -0.2));
        let position = Vec3::new(3.0, 1.0, 0.5);
        let attitude = Vec3::new(0.3, 0.02, -0.01);

        let world_se3_rig = crate::Iso3::from_parts(position.into(), rotation_from_ypr(&attitude));
        let expected = (world_se3_rig * ext).inverse();

        let (q, t) = cam_se3_world_generic(&ext.rotation, &ext.translation.vector, &position, &attitude);
        assert!(angle_between(&q, &expected.rotation) < 1e-9);
        assert!((t - expected.translation.vector).norm() < 1e-12);
    }

    #[test]
    fn average_of_single_rotation_is_identity_op() {
        let q = UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3);
        let avg = quaternion_average(&[q]).unwrap();
        assert!(angle_between(&avg, &q) < 1e-9);
    }

    #[test]
    fn average_of_copies_ignores_sign() {
        let q = UnitQuaternion::from_euler_angles(0.4, 0.1, -2.5);
        let flipped = UnitQuaternion::new_unchecked(-q.into_inner());
        let avg = quaternion_average(&[q, flipped, q, q]).unwrap();
        assert!(angle_between(&avg, &q) < 1e-9);
        assert!(avg.w >= 0.0);
    }

    #[test]
    fn average_is_order_independent() {
        let qs = [
            UnitQuaternion::from_euler_angles(0.1, 0.0, 0.5),
            UnitQuaternion::from_euler_angles(0.0, 0.05, 0.45),
            UnitQuaternion::from_euler_angles(-0.05, 0.02, 0.55),
        ];
        let a = quaternion_average(&qs).unwrap();
        let b = quaternion_average(&[qs[2], qs[0], qs[1]]).unwrap();
        assert!(angle_between(&a, &b) < 1e-9);
        assert!(angle_between(&a, &UnitQuaternion::from_euler_angles(0.0, 0.0, 0.5)) < 0.05);
    }

    #[test]
    fn average_of_empty_is_none() {
        assert!(quaternion_average(&[]).is_none());
    }
}
