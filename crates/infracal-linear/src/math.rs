//! Shared linear algebra helpers.

use infracal_core::{Mat4, Pt3, Real};
use nalgebra::{DMatrix, Matrix3x4};

/// Isotropic normalization of 3D points.
///
/// Centers the points and scales them so the mean distance to the centroid
/// is `√3`. Returns the 4x4 transform `T` with `p_norm = T * p`, or `None`
/// for empty or coincident input.
pub fn normalize_points_3d(points: &[Pt3]) -> Option<Mat4> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as Real;
    let centroid = points.iter().fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords) / n;
    let mean_dist = points.iter().map(|p| (p.coords - centroid).norm()).sum::<Real>() / n;
    if mean_dist <= Real::EPSILON {
        return None;
    }

    let s = 3.0_f64.sqrt() / mean_dist;
    #[rustfmt::skip]
    let t = Mat4::new(
        s,   0.0, 0.0, -s * centroid.x,
        0.0, s,   0.0, -s * centroid.y,
        0.0, 0.0, s,   -s * centroid.z,
        0.0, 0.0, 0.0, 1.0,
    );
    Some(t)
}

/// Reshape row `row_idx` of `v_t` (12 columns) into a row-major 3x4 matrix.
///
/// # Panics
///
/// Panics if `v_t` does not have 12 columns.
pub fn mat34_from_svd_row(v_t: &DMatrix<Real>, row_idx: usize) -> Matrix3x4<Real> {
    assert_eq!(v_t.ncols(), 12, "expected 12 columns for 3x4 matrix extraction");
    Matrix3x4::from_fn(|r, c| v_t[(row_idx, 4 * r + c)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_points_have_sqrt3_mean_distance() {
        let pts = vec![
            Pt3::new(1.0, 2.0, 3.0),
            Pt3::new(4.0, -2.0, 8.0),
            Pt3::new(-3.0, 0.5, 5.0),
            Pt3::new(0.0, 0.0, 10.0),
        ];
        let t = normalize_points_3d(&pts).unwrap();
        let normed: Vec<_> = pts
            .iter()
            .map(|p| (t * p.to_homogeneous()).xyz())
            .collect();
        let mean = normed.iter().fold(nalgebra::Vector3::zeros(), |a, p| a + p) / 4.0;
        let dist = normed.iter().map(|p| p.norm()).sum::<f64>() / 4.0;
        assert!(mean.norm() < 1e-12);
        assert!((dist - 3.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn coincident_points_are_rejected() {
        assert!(normalize_points_3d(&[Pt3::new(1.0, 1.0, 1.0); 5]).is_none());
        assert!(normalize_points_3d(&[]).is_none());
    }
}
