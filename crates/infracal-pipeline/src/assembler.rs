//! Frame-set assembly: parallel per-camera localization and keyframe gating.

use std::thread;

use image::GrayImage;
use infracal_core::{Frame, FrameSet, PinholeCamera};

use crate::estimator::FramePoseEstimator;

/// Outcome of the keyframe distance test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    /// No frame set committed yet.
    First,
    /// Minimum shared-camera displacement exceeds the threshold.
    Accepted(f64),
    TooClose(f64),
    /// No camera is localized in both frame sets.
    NoSharedCamera,
}

impl GateDecision {
    pub fn accepted(&self) -> bool {
        matches!(self, GateDecision::First | GateDecision::Accepted(_))
    }
}

/// Decide whether `candidate` is far enough from the last committed set.
pub fn keyframe_gate(previous: Option<&FrameSet>, candidate: &FrameSet, min_distance: f64) -> GateDecision {
    let Some(previous) = previous else {
        return GateDecision::First;
    };
    match candidate.min_camera_distance(previous) {
        None => GateDecision::NoSharedCamera,
        Some(d) if d > min_distance => GateDecision::Accepted(d),
        Some(d) => GateDecision::TooClose(d),
    }
}

/// Localize one image per camera concurrently.
///
/// Returns one frame per camera in camera order. A worker that panics is
/// reported and yields an unlocalized frame; sibling workers are unaffected.
pub fn localize_cameras(
    estimator: &FramePoseEstimator<'_>,
    cameras: &[PinholeCamera],
    images: &[GrayImage],
    timestamp: u64,
    preprocess: bool,
) -> Vec<Frame> {
    thread::scope(|scope| {
        let handles: Vec<_> = cameras
            .iter()
            .zip(images)
            .enumerate()
            .map(|(idx, (camera, image))| {
                scope.spawn(move || estimator.estimate(idx, camera, image, timestamp, preprocess))
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(idx, handle)| {
                handle.join().unwrap_or_else(|_| {
                    log::error!("[cam {}] t={}: localization worker panicked", idx, timestamp);
                    Frame::new(idx, timestamp, Vec::new())
                })
            })
            .collect()
    })
}

/// Keep localized frames; `None` if fewer than two cameras were localized.
pub fn collect_frame_set(timestamp: u64, frames: Vec<Frame>) -> Option<FrameSet> {
    let localized: Vec<Frame> = frames.into_iter().filter(Frame::has_pose).collect();
    if localized.len() < 2 {
        log::debug!(
            "t={}: only {} camera(s) localized, dropping frame set",
            timestamp,
            localized.len()
        );
        return None;
    }
    Some(FrameSet::new(timestamp, localized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use infracal_core::{Iso3, Vec3};

    fn posed(camera: usize, center: Vec3) -> Frame {
        let mut frame = Frame::new(camera, 0, Vec::new());
        frame.cam_se3_world = Some(Iso3::translation(center.x, center.y, center.z).inverse());
        frame
    }

    fn set(frames: Vec<Frame>) -> FrameSet {
        FrameSet::new(0, frames)
    }

    #[test]
    fn first_set_is_always_accepted() {
        let candidate = set(vec![posed(0, Vec3::zeros()), posed(1, Vec3::zeros())]);
        assert_eq!(keyframe_gate(None, &candidate, 100.0), GateDecision::First);
    }

    #[test]
    fn gate_uses_minimum_over_shared_cameras() {
        let prev = set(vec![posed(0, Vec3::zeros()), posed(1, Vec3::zeros()), posed(2, Vec3::zeros())]);
        let cand = set(vec![
            posed(0, Vec3::new(1.0, 0.0, 0.0)),
            posed(1, Vec3::new(0.2, 0.0, 0.0)),
            posed(3, Vec3::zeros()),
        ]);
        match keyframe_gate(Some(&prev), &cand, 0.3) {
            GateDecision::TooClose(d) => assert!((d - 0.2).abs() < 1e-12, "d = {}", d),
            other => panic!("unexpected {:?}", other),
        }
        assert!(keyframe_gate(Some(&prev), &cand, 0.1).accepted());
    }

    #[test]
    fn gate_threshold_is_strict() {
        let prev = set(vec![posed(0, Vec3::zeros())]);
        let cand = set(vec![posed(0, Vec3::new(0.0, 0.0, 0.5))]);
        assert!(!keyframe_gate(Some(&prev), &cand, 0.5).accepted());
    }

    #[test]
    fn disjoint_cameras_are_rejected() {
        let prev = set(vec![posed(0, Vec3::zeros()), posed(1, Vec3::zeros())]);
        let cand = set(vec![posed(2, Vec3::new(5.0, 0.0, 0.0)), posed(3, Vec3::zeros())]);
        assert_eq!(keyframe_gate(Some(&prev), &cand, 0.3), GateDecision::NoSharedCamera);
    }

    #[test]
    fn fewer_than_two_localized_frames_is_dropped() {
        let frames = vec![posed(0, Vec3::zeros()), Frame::new(1, 0, Vec::new())];
        assert!(collect_frame_set(0, frames).is_none());

        let frames = vec![
            posed(0, Vec3::zeros()),
            Frame::new(1, 0, Vec::new()),
            posed(2, Vec3::zeros()),
        ];
        let fs = collect_frame_set(0, frames).unwrap();
        assert_eq!(fs.cameras().collect::<Vec<_>>(), vec![0, 2]);
    }
}
