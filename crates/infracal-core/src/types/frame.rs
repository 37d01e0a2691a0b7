use serde::{Deserialize, Serialize};

use crate::{rotation_from_ypr, ypr_from_rotation, Iso3, Point2DFeature, Vec3};

/// One camera's observation at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub camera: usize,
    pub timestamp: u64,
    /// Pose mapping world points into this camera (`T_C_W`); `None` until the
    /// frame has been localized.
    #[serde(default)]
    pub cam_se3_world: Option<Iso3>,
    pub features: Vec<Point2DFeature>,
}

impl Frame {
    pub fn new(camera: usize, timestamp: u64, features: Vec<Point2DFeature>) -> Self {
        Self {
            camera,
            timestamp,
            cam_se3_world: None,
            features,
        }
    }

    pub fn has_pose(&self) -> bool {
        self.cam_se3_world.is_some()
    }

    /// Camera centre in world coordinates.
    pub fn camera_center(&self) -> Option<Vec3> {
        self.cam_se3_world
            .as_ref()
            .map(|pose| pose.inverse().translation.vector)
    }

    /// Keep only features carrying a 3D association.
    pub fn prune_unassociated(&mut self) {
        self.features.retain(|f| f.feature3d.is_some());
    }

    /// Features with a 3D association.
    pub fn associated_features(&self) -> impl Iterator<Item = &Point2DFeature> {
        self.features.iter().filter(|f| f.feature3d.is_some())
    }
}

/// Rig pose at one timestamp.
///
/// `attitude` is `(yaw, pitch, roll)`; the rig-to-world rotation is
/// `Rz(yaw) * Ry(pitch) * Rx(roll)` and `position` is the rig origin in
/// world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    pub timestamp: u64,
    pub position: Vec3,
    pub attitude: Vec3,
}

impl Odometry {
    pub fn new(timestamp: u64, position: Vec3, attitude: Vec3) -> Self {
        Self {
            timestamp,
            position,
            attitude,
        }
    }

    /// Build from a rig pose `T_W_R`.
    pub fn from_world_se3_rig(timestamp: u64, world_se3_rig: &Iso3) -> Self {
        let attitude = ypr_from_rotation(world_se3_rig.rotation.to_rotation_matrix().matrix());
        Self::new(timestamp, world_se3_rig.translation.vector, attitude)
    }

    pub fn world_se3_rig(&self) -> Iso3 {
        Iso3::from_parts(self.position.into(), rotation_from_ypr(&self.attitude))
    }

    /// Pose of a camera with extrinsic `ref_se3_cam` at this rig pose.
    pub fn cam_se3_world(&self, ref_se3_cam: &Iso3) -> Iso3 {
        (self.world_se3_rig() * ref_se3_cam).inverse()
    }
}

/// Synchronized group of per-camera frames sharing one timestamp.
///
/// Holds at most one frame per camera, ordered by camera index. The rig
/// odometry lives here once and applies to every frame of the set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSet {
    pub timestamp: u64,
    pub frames: Vec<Frame>,
    #[serde(default)]
    pub odometry: Option<Odometry>,
}

impl FrameSet {
    pub fn new(timestamp: u64, mut frames: Vec<Frame>) -> Self {
        frames.sort_by_key(|f| f.camera);
        Self {
            timestamp,
            frames,
            odometry: None,
        }
    }

    pub fn frame(&self, camera: usize) -> Option<&Frame> {
        self.frames.iter().find(|f| f.camera == camera)
    }

    pub fn cameras(&self) -> impl Iterator<Item = usize> + '_ {
        self.frames.iter().map(|f| f.camera)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether every camera `0..camera_count` has a localized frame.
    pub fn is_complete(&self, camera_count: usize) -> bool {
        (0..camera_count).all(|cam| self.frame(cam).is_some_and(Frame::has_pose))
    }

    /// Minimum camera-centre displacement to `previous` over the cameras
    /// localized in both sets, or `None` if they share no camera.
    pub fn min_camera_distance(&self, previous: &FrameSet) -> Option<f64> {
        self.frames
            .iter()
            .filter_map(|frame| {
                let here = frame.camera_center()?;
                let there = previous.frame(frame.camera)?.camera_center()?;
                Some((here - there).norm())
            })
            .min_by(f64::total_cmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posed(camera: usize, center: Vec3) -> Frame {
        let mut frame = Frame::new(camera, 0, Vec::new());
        frame.cam_se3_world = Some(Iso3::translation(center.x, center.y, center.z).inverse());
        frame
    }

    #[test]
    fn odometry_roundtrips_rig_pose() {
        let pose = Iso3::new(Vec3::new(1.0, 2.0, 0.5), Vec3::new(0.02, -0.05, 0.8));
        let odo = Odometry::from_world_se3_rig(7, &pose);
        let back = odo.world_se3_rig();
        assert!((back.translation.vector - pose.translation.vector).norm() < 1e-12);
        assert!(back.rotation.angle_to(&pose.rotation) < 1e-9);
    }

    #[test]
    fn frame_set_orders_frames_by_camera() {
        let set = FrameSet::new(1, vec![posed(2, Vec3::zeros()), posed(0, Vec3::zeros())]);
        assert_eq!(set.cameras().collect::<Vec<_>>(), vec![0, 2]);
        assert!(!set.is_complete(3));
        assert!(set.frame(2).is_some());
    }

    #[test]
    fn min_distance_uses_shared_cameras_only() {
        let prev = FrameSet::new(
            0,
            vec![posed(0, Vec3::zeros()), posed(1, Vec3::new(1.0, 0.0, 0.0))],
        );
        let next = FrameSet::new(
            1,
            vec![
                posed(0, Vec3::new(0.5, 0.0, 0.0)),
                posed(1, Vec3::new(1.2, 0.0, 0.0)),
                posed(2, Vec3::zeros()),
            ],
        );
        let d = next.min_camera_distance(&prev).unwrap();
        assert!((d - 0.2).abs() < 1e-12, "distance {}", d);

        let disjoint = FrameSet::new(2, vec![posed(2, Vec3::zeros())]);
        assert!(disjoint.min_camera_distance(&prev).is_none());
    }

    #[test]
    fn pruning_keeps_detection_indices() {
        use crate::{Descriptor, Keypoint, PointId};
        let mut features: Vec<_> = (0..4)
            .map(|i| Point2DFeature::new(i, Keypoint::at(i as f64, 0.0), Descriptor::Float(vec![0.0])))
            .collect();
        features[1].feature3d = Some(PointId(5));
        features[3].feature3d = Some(PointId(9));
        let mut frame = Frame::new(0, 0, features);
        frame.prune_unassociated();
        let kept: Vec<_> = frame.features.iter().map(|f| f.index).collect();
        assert_eq!(kept, vec![1, 3]);
    }
}
