//! Generic, model-agnostic RANSAC.
//!
//! Implement [`Estimator`] for a model and call [`ransac`]. The loop never
//! panics: when no consensus is found the returned [`RansacResult`] has
//! `model == None`.
//!
//! Hypotheses are ranked by inlier count, then by inlier RMS. Once sampling
//! ends, the best hypothesis is refit on its inliers; the refit replaces it
//! only if it keeps at least as many inliers.

use rand::prelude::IndexedRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacOptions {
    /// Upper bound on sampled hypotheses.
    pub max_iters: usize,
    /// Inlier residual threshold, in the estimator's residual units.
    pub thresh: f64,
    /// Minimum consensus size for a model to be accepted.
    pub min_inliers: usize,
    /// Target probability in `[0, 1)` of drawing one all-inlier sample; used
    /// to stop early. `0` disables early termination.
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            thresh: 2.0,
            min_inliers: 6,
            confidence: 0.99,
            seed: 1_234_567,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    pub model: Option<M>,
    /// Indices of inlier data, ascending.
    pub inliers: Vec<usize>,
    pub inlier_rms: f64,
    /// Hypotheses sampled.
    pub iters: usize,
}

impl<M> RansacResult<M> {
    pub fn success(&self) -> bool {
        self.model.is_some()
    }

    fn failed(iters: usize) -> Self {
        Self {
            model: None,
            inliers: Vec::new(),
            inlier_rms: f64::INFINITY,
            iters,
        }
    }
}

/// Model estimator plugged into [`ransac`].
pub trait Estimator {
    type Datum;
    type Model;

    /// Minimal sample size.
    const MIN_SAMPLES: usize;

    /// Fit a model to `data[sample]`; `None` on degenerate input.
    fn fit(&self, data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model>;

    /// Non-negative residual of one datum.
    fn residual(&self, model: &Self::Model, datum: &Self::Datum) -> f64;

    /// Fit on a full inlier set. Defaults to the minimal fit, which is
    /// appropriate for over-determined linear solvers.
    fn refit(&self, data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
        self.fit(data, inliers)
    }
}

struct Consensus {
    inliers: Vec<usize>,
    rms: f64,
}

impl Consensus {
    fn score<E: Estimator>(est: &E, model: &E::Model, data: &[E::Datum], thresh: f64) -> Self {
        let mut inliers = Vec::new();
        let mut ss = 0.0;
        for (i, datum) in data.iter().enumerate() {
            let r = est.residual(model, datum);
            if r <= thresh {
                inliers.push(i);
                ss += r * r;
            }
        }
        let rms = if inliers.is_empty() {
            f64::INFINITY
        } else {
            (ss / inliers.len() as f64).sqrt()
        };
        Self { inliers, rms }
    }

    fn beats(&self, other: &Consensus) -> bool {
        self.inliers.len() > other.inliers.len()
            || (self.inliers.len() == other.inliers.len() && self.rms < other.rms)
    }
}

/// Samples needed to draw one all-inlier minimal set with probability
/// `confidence`, given the current inlier ratio.
fn required_iterations(confidence: f64, inlier_ratio: f64, min_samples: usize) -> Option<usize> {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return None;
    }
    let all_inliers = inlier_ratio.powi(min_samples as i32);
    let denom = (1.0 - all_inliers).max(1e-12).ln();
    if denom >= 0.0 {
        return None;
    }
    Some(((1.0 - confidence).ln() / denom).ceil() as usize)
}

pub fn ransac<E: Estimator>(est: &E, data: &[E::Datum], opts: &RansacOptions) -> RansacResult<E::Model> {
    if data.len() < E::MIN_SAMPLES || E::MIN_SAMPLES == 0 {
        return RansacResult::failed(0);
    }

    let indices: Vec<usize> = (0..data.len()).collect();
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut sample = Vec::with_capacity(E::MIN_SAMPLES);

    let mut best: Option<(E::Model, Consensus)> = None;
    let mut budget = opts.max_iters;
    let mut iters = 0;

    while iters < budget {
        iters += 1;
        sample.clear();
        sample.extend(indices.choose_multiple(&mut rng, E::MIN_SAMPLES).copied());

        let Some(model) = est.fit(data, &sample) else {
            continue;
        };
        let consensus = Consensus::score(est, &model, data, opts.thresh);
        if consensus.inliers.len() < opts.min_inliers.max(E::MIN_SAMPLES) {
            continue;
        }
        if best.as_ref().is_some_and(|(_, b)| !consensus.beats(b)) {
            continue;
        }

        let ratio = consensus.inliers.len() as f64 / data.len() as f64;
        if let Some(needed) = required_iterations(opts.confidence, ratio, E::MIN_SAMPLES) {
            budget = needed.clamp(iters, opts.max_iters);
        }
        best = Some((model, consensus));
    }

    let Some((mut model, mut consensus)) = best else {
        return RansacResult::failed(iters);
    };

    if let Some(refit) = est.refit(data, &consensus.inliers) {
        let rescored = Consensus::score(est, &refit, data, opts.thresh);
        if rescored.inliers.len() >= consensus.inliers.len() {
            model = refit;
            consensus = rescored;
        }
    }

    RansacResult {
        model: Some(model),
        inliers: consensus.inliers,
        inlier_rms: consensus.rms,
        iters,
    }
}
