//! Per-image localization against the reference map.
//!
//! For one image the estimator detects features, retrieves candidate
//! reference frames, matches against each candidate and solves a robust PnP
//! on the resulting 2D-3D correspondences. The candidate with the most
//! inliers wins; on equal counts the first candidate seen is kept. On
//! success the inlier features are associated with points of the session
//! [`PointMap`], keyed by the reference point they were matched to, and the
//! frame is pruned to its associated features.

use image::GrayImage;
use infracal_core::{
    FeatureRef, Frame, FrameGraph, FrameId, Iso3, PinholeCamera, Point2DFeature, PointId, PointMap,
    Vec2,
};
use parking_lot::Mutex;

use crate::config::InfrastructureConfig;
use crate::features::{match_features, DescriptorMatcher, FeatureDetector};
use crate::pose_solver::PoseSolver;
use crate::preprocess::equalize_histogram;
use crate::recognition::PlaceRecognizer;

/// Injected capabilities used for localization.
pub struct Capabilities {
    pub detector: Box<dyn FeatureDetector>,
    pub matcher: Box<dyn DescriptorMatcher>,
    pub recognizer: Box<dyn PlaceRecognizer>,
    pub solver: Box<dyn PoseSolver>,
}

impl Capabilities {
    /// Default matcher, recognizer and pose solver around `detector`.
    pub fn new(detector: impl FeatureDetector + 'static) -> Self {
        Self {
            detector: Box::new(detector),
            matcher: Box::new(crate::features::BruteForceMatcher),
            recognizer: Box::new(crate::recognition::DescriptorIndexRecognizer::new()),
            solver: Box::new(crate::pose_solver::DltRansacSolver::default()),
        }
    }

    pub fn with_matcher(mut self, matcher: impl DescriptorMatcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn with_recognizer(mut self, recognizer: impl PlaceRecognizer + 'static) -> Self {
        self.recognizer = Box::new(recognizer);
        self
    }

    pub fn with_solver(mut self, solver: impl PoseSolver + 'static) -> Self {
        self.solver = Box::new(solver);
        self
    }
}

/// Best localization hypothesis over the retrieved candidates.
struct Localization {
    candidate: FrameId,
    cam_se3_world: Iso3,
    /// `(query feature, reference point)` inlier pairs.
    correspondences: Vec<(usize, PointId)>,
}

/// Borrowed view of everything needed to localize one image.
pub struct FramePoseEstimator<'a> {
    pub config: &'a InfrastructureConfig,
    pub reference: &'a FrameGraph,
    pub capabilities: &'a Capabilities,
    pub point_map: &'a Mutex<PointMap>,
}

impl FramePoseEstimator<'_> {
    /// Localize `image` taken by `camera_idx` at `timestamp`.
    ///
    /// Always returns a frame; a frame without pose means localization
    /// failed and its features are left as detected.
    pub fn estimate(
        &self,
        camera_idx: usize,
        camera: &PinholeCamera,
        image: &GrayImage,
        timestamp: u64,
        preprocess: bool,
    ) -> Frame {
        let equalized;
        let image = if preprocess {
            equalized = equalize_histogram(image);
            &equalized
        } else {
            image
        };

        let detector = &self.capabilities.detector;
        let keypoints = detector.detect(image);
        let descriptors = detector.compute(image, &keypoints);
        if descriptors.len() != keypoints.len() {
            log::warn!(
                "[cam {}] detector returned {} descriptors for {} keypoints",
                camera_idx,
                descriptors.len(),
                keypoints.len()
            );
        }
        let features: Vec<Point2DFeature> = keypoints
            .into_iter()
            .zip(descriptors)
            .enumerate()
            .map(|(index, (keypoint, descriptor))| Point2DFeature::new(index, keypoint, descriptor))
            .collect();

        let mut frame = Frame::new(camera_idx, timestamp, features);
        self.localize(camera, &mut frame);
        frame
    }

    /// Localize an already-detected frame in place.
    pub fn localize(&self, camera: &PinholeCamera, frame: &mut Frame) -> bool {
        let Some(best) = self.best_candidate(camera, frame) else {
            log::debug!("[cam {}] t={}: localization failed", frame.camera, frame.timestamp);
            return false;
        };

        log::info!(
            "[cam {}] t={}: {} inlier 2D-3D correspondences from reference frame {:?}",
            frame.camera,
            frame.timestamp,
            best.correspondences.len(),
            best.candidate
        );

        frame.cam_se3_world = Some(best.cam_se3_world);
        self.associate(frame, &best.correspondences);
        frame.prune_unassociated();
        true
    }

    fn best_candidate(&self, camera: &PinholeCamera, frame: &Frame) -> Option<Localization> {
        let config = self.config;
        let min_2d3d = config.min_correspondences_2d3d;

        let query_descriptors: Vec<_> = frame.features.iter().map(|f| f.descriptor.clone()).collect();
        let lifted: Vec<Option<Vec2>> = frame
            .features
            .iter()
            .map(|f| {
                camera
                    .lift_projective(&f.keypoint.pixel())
                    .map(|ray| Vec2::new(ray.x / ray.z, ray.y / ray.z))
            })
            .collect();

        let candidates = self
            .capabilities
            .recognizer
            .knn_match(frame, config.nearest_image_matches);

        let mut best: Option<Localization> = None;
        for candidate in candidates {
            let Some(train) = self.reference.frame(candidate) else {
                log::warn!("recognizer returned unknown frame {:?}", candidate);
                continue;
            };

            let train_descriptors: Vec<_> = train.features.iter().map(|f| f.descriptor.clone()).collect();
            let matches = match_features(
                &query_descriptors,
                &train_descriptors,
                self.capabilities.matcher.as_ref(),
                config.max_distance_ratio,
            );
            if matches.len() < config.min_correspondences_2d2d {
                continue;
            }

            let mut pairs = Vec::new();
            let mut world = Vec::new();
            let mut image = Vec::new();
            for m in &matches {
                let Some(source) = train.features[m.train].feature3d else {
                    continue;
                };
                let Some(point) = self.reference.point(source) else {
                    continue;
                };
                let Some(uv) = lifted[m.query] else {
                    continue;
                };
                pairs.push((m.query, source));
                world.push(point.position);
                image.push(uv);
            }
            if pairs.len() < min_2d3d {
                continue;
            }

            let Some(estimate) = self.capabilities.solver.solve(
                &world,
                &image,
                config.scaled_reproj_thresh(),
                config.pnp_max_iterations,
            ) else {
                continue;
            };
            let inliers = estimate.inliers.len();
            if inliers < min_2d3d {
                continue;
            }
            if best
                .as_ref()
                .is_some_and(|b| b.correspondences.len() >= inliers)
            {
                continue;
            }

            best = Some(Localization {
                candidate,
                cam_se3_world: estimate.cam_se3_world,
                correspondences: estimate.inliers.iter().map(|&i| pairs[i]).collect(),
            });
        }
        best
    }

    fn associate(&self, frame: &mut Frame, correspondences: &[(usize, PointId)]) {
        let (camera, timestamp) = (frame.camera, frame.timestamp);
        for &(feature_idx, source) in correspondences {
            let Some(position) = self.reference.point(source).map(|p| p.position) else {
                continue;
            };
            let feature = &mut frame.features[feature_idx];

            let mut map = self.point_map.lock();
            let id = map.get_or_insert(source, position);
            map.observe(
                id,
                FeatureRef {
                    timestamp,
                    camera,
                    index: feature.index,
                },
            );
            feature.feature3d = Some(id);
        }
    }
}
