use anyhow::{ensure, Result};
use infracal_core::{Real, Vec3};
use nalgebra::{DVector, DVectorView, Quaternion, UnitQuaternion};

/// Unit quaternion as a 4D parameter vector `[qx, qy, qz, qw]`.
pub fn quat_to_dvec(q: &UnitQuaternion<Real>) -> DVector<f64> {
    let c = q.quaternion().coords;
    nalgebra::dvector![c[0], c[1], c[2], c[3]]
}

/// Parameter vector `[qx, qy, qz, qw]` to a unit quaternion (renormalized).
pub fn dvec_to_quat(v: DVectorView<'_, f64>) -> Result<UnitQuaternion<Real>> {
    ensure!(v.len() == 4, "expected quaternion vector of length 4, got {}", v.len());
    let q = Quaternion::new(v[3], v[0], v[1], v[2]);
    ensure!(q.norm() > Real::EPSILON, "quaternion parameter has zero norm");
    Ok(UnitQuaternion::from_quaternion(q))
}

pub fn vec3_to_dvec(v: &Vec3) -> DVector<f64> {
    nalgebra::dvector![v.x, v.y, v.z]
}

pub fn dvec_to_vec3(v: DVectorView<'_, f64>) -> Result<Vec3> {
    ensure!(v.len() == 3, "expected 3-vector, got length {}", v.len());
    Ok(Vec3::new(v[0], v[1], v[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quaternion_layout_is_xyzw() {
        let q = UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1);
        let v = quat_to_dvec(&q);
        assert_eq!(v[3], q.w);
        assert_eq!(v[0], q.i);
        let back = dvec_to_quat(v.as_view()).unwrap();
        assert!(back.angle_to(&q) < 1e-12);
        assert!(dvec_to_quat(DVector::zeros(4).as_view()).is_err());
        assert!(dvec_to_vec3(DVector::zeros(4).as_view()).is_err());
    }
}
