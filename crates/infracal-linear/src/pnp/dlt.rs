use infracal_core::{Iso3, Pt3, Real, Vec2};
use nalgebra::{DMatrix, Rotation3, Translation3, UnitQuaternion};

use super::{PnpError, PNP_MIN_POINTS};
use crate::math::{mat34_from_svd_row, normalize_points_3d};

/// Direct linear PnP on all input correspondences.
///
/// `image` holds normalized image coordinates. The world points are
/// normalized before the solve; the rotation block is projected onto SO(3)
/// and the translation rescaled consistently.
pub fn dlt(world: &[Pt3], image: &[Vec2]) -> Result<Iso3, PnpError> {
    let n = world.len();
    if image.len() != n {
        return Err(PnpError::LengthMismatch(n, image.len()));
    }
    if n < PNP_MIN_POINTS {
        return Err(PnpError::NotEnoughPoints(n));
    }

    let t_world = normalize_points_3d(world).ok_or(PnpError::DegeneratePoints)?;

    let mut a = DMatrix::<Real>::zeros(2 * n, 12);
    for (i, (pw, uv)) in world.iter().zip(image).enumerate() {
        let p = t_world * pw.to_homogeneous();
        let (x, y, z) = (p.x, p.y, p.z);
        let (u, v) = (uv.x, uv.y);

        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = z;
        a[(r0, 3)] = 1.0;
        a[(r0, 8)] = -u * x;
        a[(r0, 9)] = -u * y;
        a[(r0, 10)] = -u * z;
        a[(r0, 11)] = -u;

        a[(r1, 4)] = x;
        a[(r1, 5)] = y;
        a[(r1, 6)] = z;
        a[(r1, 7)] = 1.0;
        a[(r1, 8)] = -v * x;
        a[(r1, 9)] = -v * y;
        a[(r1, 10)] = -v * z;
        a[(r1, 11)] = -v;
    }

    // Null vector of A.
    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(PnpError::SvdFailed)?;
    let smallest = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
        .ok_or(PnpError::SvdFailed)?;
    let p_mtx = mat34_from_svd_row(&v_t, smallest) * t_world;

    let mut r_approx = p_mtx.fixed_view::<3, 3>(0, 0).into_owned();
    let mut s = (r_approx.row(0).norm() + r_approx.row(1).norm() + r_approx.row(2).norm()) / 3.0;
    if s <= Real::EPSILON {
        return Err(PnpError::DegeneratePoints);
    }
    if r_approx.determinant() < 0.0 {
        s = -s;
    }
    r_approx /= s;

    let svd = r_approx.svd(true, true);
    let u = svd.u.ok_or(PnpError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(PnpError::SvdFailed)?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t = p_mtx.column(3).into_owned() / s;
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(Iso3::from_parts(Translation3::from(t), rot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use infracal_core::Vec3;

    fn scene(pose: &Iso3) -> (Vec<Pt3>, Vec<Vec2>) {
        let mut world = Vec::new();
        let mut image = Vec::new();
        for i in 0..4 {
            for j in 0..3 {
                for k in 0..2 {
                    let pw = Pt3::new(i as Real * 0.7 - 1.0, j as Real * 0.5, 4.0 + k as Real * 1.3 + 0.1 * i as Real);
                    let pc = pose.transform_point(&pw);
                    world.push(pw);
                    image.push(Vec2::new(pc.x / pc.z, pc.y / pc.z));
                }
            }
        }
        (world, image)
    }

    #[test]
    fn recovers_exact_pose() {
        let gt = Iso3::new(Vec3::new(0.2, -0.1, 0.5), Vec3::new(0.1, -0.2, 0.05));
        let (world, image) = scene(&gt);
        let est = dlt(&world, &image).unwrap();
        assert!((est.translation.vector - gt.translation.vector).norm() < 1e-6);
        assert!(est.rotation.angle_to(&gt.rotation) < 1e-6);
    }

    #[test]
    fn rejects_too_few_or_mismatched_points() {
        let gt = Iso3::identity();
        let (world, image) = scene(&gt);
        assert!(matches!(
            dlt(&world[..5], &image[..5]),
            Err(PnpError::NotEnoughPoints(5))
        ));
        assert!(matches!(
            dlt(&world, &image[..7]),
            Err(PnpError::LengthMismatch(_, 7))
        ));
        assert!(matches!(
            dlt(&[Pt3::origin(); 8], &image[..8]),
            Err(PnpError::DegeneratePoints)
        ));
    }
}
