//! Feature pipeline capabilities: detection and descriptor matching.

use image::GrayImage;
use infracal_core::{Descriptor, Keypoint};

/// Keypoint detector and descriptor extractor.
pub trait FeatureDetector: Send + Sync {
    fn detect(&self, image: &GrayImage) -> Vec<Keypoint>;

    /// One descriptor per keypoint, in order.
    fn compute(&self, image: &GrayImage, keypoints: &[Keypoint]) -> Vec<Descriptor>;
}

/// One nearest-neighbour candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorMatch {
    pub query: usize,
    pub train: usize,
    pub distance: f32,
}

/// k-nearest-neighbour descriptor search.
pub trait DescriptorMatcher: Send + Sync {
    /// For every query descriptor, up to `k` train candidates sorted by
    /// increasing distance.
    fn knn_match(&self, query: &[Descriptor], train: &[Descriptor], k: usize) -> Vec<Vec<DescriptorMatch>>;
}

/// Exhaustive matcher using Hamming distance for binary descriptors and L2
/// for float descriptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceMatcher;

impl DescriptorMatcher for BruteForceMatcher {
    fn knn_match(&self, query: &[Descriptor], train: &[Descriptor], k: usize) -> Vec<Vec<DescriptorMatch>> {
        query
            .iter()
            .enumerate()
            .map(|(qi, q)| {
                let mut candidates: Vec<DescriptorMatch> = train
                    .iter()
                    .enumerate()
                    .filter_map(|(ti, t)| {
                        q.distance(t).map(|distance| DescriptorMatch {
                            query: qi,
                            train: ti,
                            distance,
                        })
                    })
                    .collect();
                candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
                candidates.truncate(k);
                candidates
            })
            .collect()
    }
}

fn compatible(query: &[Descriptor], train: &[Descriptor]) -> bool {
    let Some(reference) = query.first().or(train.first()) else {
        return true;
    };
    query
        .iter()
        .chain(train.iter())
        .all(|d| d.is_compatible(reference))
}

/// Best match per query that passes the ratio test.
fn ratio_filtered(candidates: &[Vec<DescriptorMatch>], ratio: f64) -> Vec<Option<DescriptorMatch>> {
    candidates
        .iter()
        .map(|c| match c.as_slice() {
            [best, second, ..] if ((best.distance / second.distance) as f64) < ratio => Some(*best),
            _ => None,
        })
        .collect()
}

/// Mutually-best matches between `query` and `train` that pass the ratio
/// test in both directions.
///
/// Returned matches index into `query` and `train`. Descriptor sets of
/// different kind or length produce no matches.
pub fn match_features(
    query: &[Descriptor],
    train: &[Descriptor],
    matcher: &dyn DescriptorMatcher,
    ratio: f64,
) -> Vec<DescriptorMatch> {
    if query.is_empty() || train.is_empty() {
        return Vec::new();
    }
    if !compatible(query, train) {
        log::warn!("descriptor kinds or lengths do not match, skipping");
        return Vec::new();
    }

    let forward = ratio_filtered(&matcher.knn_match(query, train, 2), ratio);
    let reverse = ratio_filtered(&matcher.knn_match(train, query, 2), ratio);

    forward
        .iter()
        .flatten()
        .filter(|fwd| {
            reverse
                .get(fwd.train)
                .copied()
                .flatten()
                .is_some_and(|rev| rev.train == fwd.query && rev.query == fwd.train)
        })
        .copied()
        .collect()
}
