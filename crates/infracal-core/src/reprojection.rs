//! Reprojection oracle and error aggregates.
//!
//! [`reprojection_error`] composes a camera's extrinsic with the rig
//! odometry through [`cam_se3_world_generic`], the same routine the
//! optimizer residual evaluates, so errors measured here and costs minimized
//! there agree.

use serde::{Deserialize, Serialize};

use crate::{
    cam_se3_world_generic, CameraRigExtrinsics, Frame, FrameSet, Iso3, Odometry, PinholeCamera,
    Point3DFeature, Pt3, Vec2,
};

/// Pixel error of `p_w` observed at `observed` by `camera`, with the camera
/// placed by extrinsic `ref_se3_cam` on a rig at `odometry`.
pub fn reprojection_error(
    camera: &PinholeCamera,
    p_w: &Pt3,
    ref_se3_cam: &Iso3,
    odometry: &Odometry,
    observed: &Vec2,
) -> f64 {
    let (rot, trans) = cam_se3_world_generic(
        &ref_se3_cam.rotation,
        &ref_se3_cam.translation.vector,
        &odometry.position,
        &odometry.attitude,
    );
    let cam_se3_world = Iso3::from_parts(trans.into(), rot);
    camera.reprojection_error(p_w, &cam_se3_world, observed)
}

/// Min / max / mean reprojection error over a set of observations.
///
/// An empty set reports all zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: usize,
}

impl ErrorStats {
    pub fn from_errors<I: IntoIterator<Item = f64>>(errors: I) -> Self {
        let mut acc = Accumulator::default();
        for e in errors {
            acc.push(e);
        }
        acc.finish()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Combine two aggregates, weighting averages by count. Empty
    /// aggregates do not contribute to min / max.
    pub fn merge(&self, other: &ErrorStats) -> ErrorStats {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => *other,
            (_, true) => *self,
            _ => {
                let count = self.count + other.count;
                ErrorStats {
                    min: self.min.min(other.min),
                    max: self.max.max(other.max),
                    avg: (self.avg * self.count as f64 + other.avg * other.count as f64)
                        / count as f64,
                    count,
                }
            }
        }
    }
}

impl std::fmt::Display for ErrorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "avg {:.4} px, min {:.4} px, max {:.4} px over {} observations",
            self.avg, self.min, self.max, self.count
        )
    }
}

#[derive(Default)]
struct Accumulator {
    min: f64,
    max: f64,
    sum: f64,
    count: usize,
}

impl Accumulator {
    fn push(&mut self, e: f64) {
        if self.count == 0 {
            self.min = e;
            self.max = e;
        } else {
            self.min = self.min.min(e);
            self.max = self.max.max(e);
        }
        self.sum += e;
        self.count += 1;
    }

    fn finish(self) -> ErrorStats {
        if self.count == 0 {
            return ErrorStats::default();
        }
        ErrorStats {
            min: self.min,
            max: self.max,
            avg: self.sum / self.count as f64,
            count: self.count,
        }
    }
}

/// `(point, observed pixel)` pairs of a frame's associated features.
fn associated_observations<'a>(
    frame: &'a Frame,
    points: &'a [Point3DFeature],
) -> impl Iterator<Item = (&'a Pt3, Vec2)> + 'a {
    frame.features.iter().filter_map(move |f| {
        let point = points.get(f.feature3d?.0)?;
        Some((&point.position, f.keypoint.pixel()))
    })
}

/// Error of a frame's own PnP pose, independent of extrinsics and odometry.
/// A frame without pose reports zeros.
pub fn frame_pnp_error(camera: &PinholeCamera, frame: &Frame, points: &[Point3DFeature]) -> ErrorStats {
    let Some(pose) = frame.cam_se3_world.as_ref() else {
        return ErrorStats::default();
    };
    ErrorStats::from_errors(
        associated_observations(frame, points)
            .map(|(p_w, uv)| camera.reprojection_error(p_w, pose, &uv)),
    )
}

/// Error of a frame under a rig odometry and camera extrinsic.
pub fn frame_error(
    camera: &PinholeCamera,
    frame: &Frame,
    points: &[Point3DFeature],
    odometry: &Odometry,
    ref_se3_cam: &Iso3,
) -> ErrorStats {
    ErrorStats::from_errors(
        associated_observations(frame, points)
            .map(|(p_w, uv)| reprojection_error(camera, p_w, ref_se3_cam, odometry, &uv)),
    )
}

/// Error over all frames of a frame set. A set without odometry, or frames
/// of unknown cameras, contribute nothing.
pub fn frame_set_error(
    cameras: &[PinholeCamera],
    frame_set: &FrameSet,
    points: &[Point3DFeature],
    extrinsics: &CameraRigExtrinsics,
) -> ErrorStats {
    let Some(odometry) = frame_set.odometry.as_ref() else {
        return ErrorStats::default();
    };
    frame_set
        .frames
        .iter()
        .filter_map(|frame| {
            let camera = cameras.get(frame.camera)?;
            let ext = extrinsics.get(frame.camera)?;
            Some(frame_error(camera, frame, points, odometry, ext))
        })
        .fold(ErrorStats::default(), |acc, s| acc.merge(&s))
}

/// Error over a whole session.
pub fn session_error(
    cameras: &[PinholeCamera],
    frame_sets: &[FrameSet],
    points: &[Point3DFeature],
    extrinsics: &CameraRigExtrinsics,
) -> ErrorStats {
    frame_sets
        .iter()
        .map(|set| frame_set_error(cameras, set, points, extrinsics))
        .fold(ErrorStats::default(), |acc, s| acc.merge(&s))
}

/// Mean PnP error over all localized frames, each frame weighted by its
/// number of associated features.
pub fn mean_frame_pnp_error(
    cameras: &[PinholeCamera],
    frame_sets: &[FrameSet],
    points: &[Point3DFeature],
) -> f64 {
    frame_sets
        .iter()
        .flat_map(|set| set.frames.iter())
        .filter(|frame| frame.has_pose())
        .filter_map(|frame| {
            let camera = cameras.get(frame.camera)?;
            Some(frame_pnp_error(camera, frame, points))
        })
        .fold(ErrorStats::default(), |acc, s| acc.merge(&s))
        .avg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CameraIntrinsics, Descriptor, Keypoint, Point2DFeature, PointId, Vec3};

    fn camera() -> PinholeCamera {
        PinholeCamera::new(CameraIntrinsics {
            fx: 300.0,
            fy: 300.0,
            cx: 320.0,
            cy: 240.0,
            skew: 0.0,
        })
    }

    #[test]
    fn oracle_matches_composed_pose() {
        let cam = camera();
        let ext = Iso3::new(Vec3::new(0.2, -0.1, 0.05), Vec3::new(0.0, 1.2, 0.1));
        let odo = Odometry::new(0, Vec3::new(4.0, -1.0, 0.3), Vec3::new(0.6, 0.05, -0.02));
        let pose = odo.cam_se3_world(&ext);

        let p_w = pose.inverse_transform_point(&Pt3::new(0.3, 0.2, 4.0));
        let uv = cam.project(&pose.transform_point(&p_w));
        let err = reprojection_error(&cam, &p_w, &ext, &odo, &uv);
        assert!(err < 1e-9, "error {}", err);

        let observed = uv + Vec2::new(1.5, -2.0);
        let err = reprojection_error(&cam, &p_w, &ext, &odo, &observed);
        let expected = cam.reprojection_error(&p_w, &pose, &observed);
        assert!((err - expected).abs() < 1e-9, "{} vs {}", err, expected);
        assert!(err >= 0.0);
    }

    #[test]
    fn empty_stats_are_zero() {
        let s = ErrorStats::from_errors(std::iter::empty());
        assert_eq!(s, ErrorStats::default());
        assert_eq!(s.merge(&s), ErrorStats::default());
    }

    #[test]
    fn merge_weights_by_count_and_skips_empty() {
        let a = ErrorStats::from_errors([1.0, 3.0]);
        let b = ErrorStats::from_errors([6.0]);
        let m = a.merge(&ErrorStats::default()).merge(&b);
        assert_eq!(m.count, 3);
        assert!((m.avg - 10.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.min, 1.0);
        assert_eq!(m.max, 6.0);
    }

    #[test]
    fn frame_set_error_skips_unassociated_features() {
        let cam = camera();
        let odo = Odometry::new(5, Vec3::zeros(), Vec3::zeros());
        let ext = CameraRigExtrinsics::new(1);
        let points = vec![Point3DFeature::new(Pt3::new(0.0, 0.0, 2.0))];

        let mut associated =
            Point2DFeature::new(0, Keypoint::at(320.0, 243.0), Descriptor::Float(vec![0.0]));
        associated.feature3d = Some(PointId(0));
        let loose = Point2DFeature::new(1, Keypoint::at(0.0, 0.0), Descriptor::Float(vec![0.0]));
        let mut frame = Frame::new(0, 5, vec![associated, loose]);
        frame.cam_se3_world = Some(Iso3::identity());

        let mut set = FrameSet::new(5, vec![frame]);
        assert!(frame_set_error(&[cam.clone()], &set, &points, &ext).is_empty());

        set.odometry = Some(odo);
        let stats = session_error(&[cam.clone()], &[set.clone()], &points, &ext);
        assert_eq!(stats.count, 1);
        assert!((stats.avg - 3.0).abs() < 1e-9, "avg {}", stats.avg);

        let pnp = frame_pnp_error(&cam, &set.frames[0], &points);
        assert!((pnp.avg - 3.0).abs() < 1e-9);
        assert!((mean_frame_pnp_error(&[cam], &[set], &points) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn mean_pnp_error_weights_frames_by_feature_count() {
        let cam = camera();
        let points = vec![Point3DFeature::new(Pt3::new(0.0, 0.0, 2.0))];
        let localized = |timestamp: u64, rows: &[f64]| {
            let features = rows
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    let mut f =
                        Point2DFeature::new(i, Keypoint::at(320.0, v), Descriptor::Float(vec![0.0]));
                    f.feature3d = Some(PointId(0));
                    f
                })
                .collect();
            let mut frame = Frame::new(0, timestamp, features);
            frame.cam_se3_world = Some(Iso3::identity());
            FrameSet::new(timestamp, vec![frame])
        };
        let sets = vec![localized(1, &[243.0]), localized(2, &[241.0, 239.0, 241.0])];
        let mut unlocalized = localized(3, &[250.0]);
        unlocalized.frames[0].cam_se3_world = None;

        let mean = mean_frame_pnp_error(&[cam.clone()], &sets, &points);
        assert!((mean - 1.5).abs() < 1e-9, "mean {}", mean);

        let with_unlocalized = [sets.clone(), vec![unlocalized]].concat();
        let mean = mean_frame_pnp_error(&[cam], &with_unlocalized, &points);
        assert!((mean - 1.5).abs() < 1e-9, "mean {}", mean);
        assert_eq!(mean_frame_pnp_error(&[], &sets, &points), 0.0);
    }
}
