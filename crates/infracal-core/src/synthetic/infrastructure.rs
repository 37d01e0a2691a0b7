//! Synthetic corridor scene observed by a three-camera rig.
//!
//! World axes: the corridor runs along `+z`, walls at `x = ±half_width`,
//! floor and ceiling at `y = ±half_height`. With zero attitude the rig frame
//! coincides with the world axes and camera 0 looks down the corridor.

use nalgebra::{Translation3, UnitQuaternion};

use super::noise::{hash_unit, PixelNoise};
use crate::{
    CameraIntrinsics, CameraRigExtrinsics, Descriptor, Frame, FrameGraph, FrameSet, Iso3,
    Keypoint, Odometry, PinholeCamera, Point2DFeature, Point3DFeature, PointId, Pt3, Real, Vec2,
    Vec3,
};

pub const IMAGE_WIDTH: Real = 640.0;
pub const IMAGE_HEIGHT: Real = 480.0;

/// Corridor point cloud with one descriptor per point.
#[derive(Debug, Clone)]
pub struct Scene {
    pub points: Vec<Pt3>,
    pub descriptors: Vec<Descriptor>,
}

impl Scene {
    /// `count` points scattered over the four corridor faces for
    /// `z in [0, length)`, each with a `dim`-dimensional float descriptor.
    pub fn corridor(count: usize, length: Real, seed: u64) -> Self {
        let half_width = 3.0;
        let half_height = 2.0;
        let points = (0..count)
            .map(|i| {
                let i = i as u64;
                let z = hash_unit(seed, i, 0) * length;
                let s = hash_unit(seed, i, 1) * 2.0 - 1.0;
                match i % 4 {
                    0 => Pt3::new(-half_width, s * half_height, z),
                    1 => Pt3::new(half_width, s * half_height, z),
                    2 => Pt3::new(s * half_width, -half_height, z),
                    _ => Pt3::new(s * half_width, half_height, z),
                }
            })
            .collect();
        let descriptors = (0..count)
            .map(|i| float_descriptor(seed.wrapping_add(1), i as u64, 32))
            .collect();
        Self {
            points,
            descriptors,
        }
    }
}

/// Random float descriptor in `[0, 1)^dim`.
pub fn float_descriptor(seed: u64, key: u64, dim: usize) -> Descriptor {
    Descriptor::Float(
        (0..dim)
            .map(|d| hash_unit(seed, key, d as u64 + 2) as f32)
            .collect(),
    )
}

/// Cameras and ground-truth extrinsics of a synthetic rig.
#[derive(Debug, Clone)]
pub struct SyntheticRig {
    pub cameras: Vec<PinholeCamera>,
    pub extrinsics: CameraRigExtrinsics,
}

impl SyntheticRig {
    /// Camera 0 looks forward; cameras 1 and 2 are yawed left and right
    /// about the rig's vertical axis and offset sideways.
    pub fn three_cameras() -> Self {
        let intrinsics = CameraIntrinsics {
            fx: 300.0,
            fy: 300.0,
            cx: IMAGE_WIDTH / 2.0,
            cy: IMAGE_HEIGHT / 2.0,
            skew: 0.0,
        };
        let cameras = vec![PinholeCamera::new(intrinsics); 3];
        let side = |sign: Real| {
            Iso3::from_parts(
                Translation3::new(sign * 0.4, 0.05, -0.2),
                UnitQuaternion::from_euler_angles(0.02 * sign, sign * 0.5, 0.01),
            )
        };
        let extrinsics = CameraRigExtrinsics {
            ref_se3_cam: vec![Iso3::identity(), side(-1.0), side(1.0)],
        };
        Self {
            cameras,
            extrinsics,
        }
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    /// Pose of camera `camera` when the rig is at `odometry`.
    pub fn cam_se3_world(&self, camera: usize, odometry: &Odometry) -> Iso3 {
        odometry.cam_se3_world(&self.extrinsics.ref_se3_cam[camera])
    }
}

/// Rig odometry moving down the corridor with a gentle wobble.
pub fn trajectory(count: usize, start_z: Real, step: Real) -> Vec<Odometry> {
    (0..count)
        .map(|i| {
            let t = i as Real;
            Odometry::new(
                1_000 + i as u64 * 100,
                Vec3::new(0.3 * (0.7 * t).sin(), 0.05 * (1.3 * t).cos(), start_z + step * t),
                Vec3::new(0.05 * (0.5 * t).sin(), 0.03 * (0.9 * t).cos(), 0.02 * t.sin()),
            )
        })
        .collect()
}

/// Projections `(point index, pixel)` of the scene points visible in an
/// image of [`IMAGE_WIDTH`] x [`IMAGE_HEIGHT`].
pub fn visible(camera: &PinholeCamera, cam_se3_world: &Iso3, points: &[Pt3]) -> Vec<(usize, Vec2)> {
    points
        .iter()
        .enumerate()
        .filter_map(|(i, p_w)| {
            let p_c = cam_se3_world.transform_point(p_w);
            if p_c.z < 0.5 {
                return None;
            }
            let uv = camera.project(&p_c);
            let inside = uv.x >= 0.0 && uv.x < IMAGE_WIDTH && uv.y >= 0.0 && uv.y < IMAGE_HEIGHT;
            inside.then_some((i, uv))
        })
        .collect()
}

/// A frame observing `scene` from `cam_se3_world`. Features are associated
/// with scene point ids when `associate` is set and carry the scene
/// descriptors; the frame's pose is left unset.
pub fn observe(
    scene: &Scene,
    camera_idx: usize,
    camera: &PinholeCamera,
    cam_se3_world: &Iso3,
    timestamp: u64,
    noise: PixelNoise,
    associate: bool,
) -> Frame {
    let features = visible(camera, cam_se3_world, &scene.points)
        .into_iter()
        .enumerate()
        .map(|(index, (pid, uv))| {
            let uv = uv + noise.sample(timestamp ^ ((camera_idx as u64) << 48), pid);
            let mut f = Point2DFeature::new(
                index,
                Keypoint::at(uv.x, uv.y),
                scene.descriptors[pid].clone(),
            );
            if associate {
                f.feature3d = Some(PointId(pid));
            }
            f
        })
        .collect();
    Frame::new(camera_idx, timestamp, features)
}

/// Reference map of `scene`: one segment per camera, one posed frame per
/// rig pose, features associated with the scene points.
pub fn reference_map(scene: &Scene, rig: &SyntheticRig, poses: &[Odometry]) -> FrameGraph {
    let mut graph = FrameGraph::new(rig.camera_count());
    for (camera_idx, camera) in rig.cameras.iter().enumerate() {
        let frames = poses
            .iter()
            .map(|odo| {
                let pose = rig.cam_se3_world(camera_idx, odo);
                let mut frame = observe(
                    scene,
                    camera_idx,
                    camera,
                    &pose,
                    odo.timestamp,
                    PixelNoise::default(),
                    true,
                );
                frame.cam_se3_world = Some(pose);
                frame
            })
            .collect();
        graph.segments[camera_idx].push(frames);
    }
    graph.points = scene
        .points
        .iter()
        .map(|&p| Point3DFeature::new(p))
        .collect();
    graph.rebuild_observations();
    graph
}

/// Localized session frame sets with odometry unset, as they would come out
/// of the frame-set assembler. Features are associated with the reference
/// point ids; `missing` lists `(set, camera)` pairs to drop.
pub fn session(
    scene: &Scene,
    rig: &SyntheticRig,
    poses: &[Odometry],
    noise: PixelNoise,
    missing: &[(usize, usize)],
) -> Vec<FrameSet> {
    poses
        .iter()
        .enumerate()
        .map(|(set_idx, odo)| {
            let frames = (0..rig.camera_count())
                .filter(|cam| !missing.contains(&(set_idx, *cam)))
                .map(|cam| {
                    let pose = rig.cam_se3_world(cam, odo);
                    let mut frame =
                        observe(scene, cam, &rig.cameras[cam], &pose, odo.timestamp, noise, true);
                    frame.cam_se3_world = Some(pose);
                    frame
                })
                .collect();
            FrameSet::new(odo.timestamp, frames)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_camera_sees_the_corridor() {
        let scene = Scene::corridor(600, 60.0, 3);
        let rig = SyntheticRig::three_cameras();
        for odo in trajectory(5, 0.0, 1.0) {
            for cam in 0..3 {
                let pose = rig.cam_se3_world(cam, &odo);
                let seen = visible(&rig.cameras[cam], &pose, &scene.points);
                assert!(seen.len() > 60, "camera {} sees {}", cam, seen.len());
            }
        }
    }

    #[test]
    fn reference_map_is_consistent() {
        let scene = Scene::corridor(300, 40.0, 5);
        let rig = SyntheticRig::three_cameras();
        let graph = reference_map(&scene, &rig, &trajectory(3, 0.0, 1.0));
        graph.validate().unwrap();
        assert_eq!(graph.frame_count(), 9);
        assert!(graph.points.iter().any(|p| p.observations.len() > 3));
    }
}
