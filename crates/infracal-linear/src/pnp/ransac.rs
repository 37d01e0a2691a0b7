use infracal_core::{ransac, Estimator, Iso3, Pt3, RansacOptions, Vec2};

use super::{dlt, PnpError, PNP_MIN_POINTS};

/// Options for [`dlt_ransac`].
#[derive(Debug, Clone, PartialEq)]
pub struct PnpRansacOptions {
    /// Inlier threshold in normalized image units.
    pub threshold: f64,
    pub max_iters: usize,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for PnpRansacOptions {
    fn default() -> Self {
        Self {
            threshold: 2.0 / 300.0,
            max_iters: 200,
            confidence: 0.99,
            seed: 1_234_567,
        }
    }
}

/// Distance between the normalized projection of `pw` under `cam_se3_world`
/// and `uv`. Points at or behind the camera are never inliers.
pub fn normalized_residual(cam_se3_world: &Iso3, pw: &Pt3, uv: &Vec2) -> f64 {
    let pc = cam_se3_world.transform_point(pw);
    if pc.z <= 1e-9 {
        return f64::INFINITY;
    }
    (Vec2::new(pc.x / pc.z, pc.y / pc.z) - uv).norm()
}

struct DltEstimator;

impl Estimator for DltEstimator {
    type Datum = (Pt3, Vec2);
    type Model = Iso3;

    const MIN_SAMPLES: usize = PNP_MIN_POINTS;

    fn fit(&self, data: &[Self::Datum], sample: &[usize]) -> Option<Iso3> {
        let (world, image): (Vec<Pt3>, Vec<Vec2>) = sample.iter().map(|&i| data[i]).unzip();
        dlt(&world, &image).ok()
    }

    fn residual(&self, model: &Iso3, (pw, uv): &Self::Datum) -> f64 {
        normalized_residual(model, pw, uv)
    }
}

/// Robust PnP: normalized DLT on minimal samples inside RANSAC, refit on
/// the final consensus set.
///
/// Returns `T_C_W` and the ascending inlier indices.
pub fn dlt_ransac(
    world: &[Pt3],
    image: &[Vec2],
    opts: &PnpRansacOptions,
) -> Result<(Iso3, Vec<usize>), PnpError> {
    let n = world.len();
    if image.len() != n {
        return Err(PnpError::LengthMismatch(n, image.len()));
    }
    if n < PNP_MIN_POINTS {
        return Err(PnpError::NotEnoughPoints(n));
    }

    let data: Vec<(Pt3, Vec2)> = world.iter().copied().zip(image.iter().copied()).collect();
    let ransac_opts = RansacOptions {
        max_iters: opts.max_iters,
        thresh: opts.threshold,
        min_inliers: PNP_MIN_POINTS,
        confidence: opts.confidence,
        seed: opts.seed,
    };

    let res = ransac(&DltEstimator, &data, &ransac_opts);
    let Some(pose) = res.model else {
        return Err(PnpError::RansacFailed);
    };
    log::trace!(
        "pnp ransac: {} / {} inliers after {} iterations",
        res.inliers.len(),
        n,
        res.iters
    );
    Ok((pose, res.inliers))
}
