use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::{FeatureRef, Frame, Point3DFeature, PointId};

/// Address of a frame inside a [`FrameGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameId {
    pub camera: usize,
    pub segment: usize,
    pub frame: usize,
}

/// Frames grouped by camera and segment, with the 3D points their features
/// are associated with.
///
/// `segments[camera][segment][frame]`. Feature associations index into
/// `points`. This is both the reference map structure and the persisted
/// session structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameGraph {
    pub segments: Vec<Vec<Vec<Frame>>>,
    pub points: Vec<Point3DFeature>,
}

impl FrameGraph {
    /// Empty graph with no segments for `camera_count` cameras.
    pub fn new(camera_count: usize) -> Self {
        Self {
            segments: vec![Vec::new(); camera_count],
            points: Vec::new(),
        }
    }

    pub fn camera_count(&self) -> usize {
        self.segments.len()
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.segments
            .get(id.camera)?
            .get(id.segment)?
            .get(id.frame)
    }

    pub fn point(&self, id: PointId) -> Option<&Point3DFeature> {
        self.points.get(id.0)
    }

    /// All frame ids in camera, segment, frame order.
    pub fn frame_ids(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.segments.iter().enumerate().flat_map(|(camera, segs)| {
            segs.iter().enumerate().flat_map(move |(segment, frames)| {
                (0..frames.len()).map(move |frame| FrameId {
                    camera,
                    segment,
                    frame,
                })
            })
        })
    }

    pub fn frame_count(&self) -> usize {
        self.segments.iter().flatten().map(Vec::len).sum()
    }

    /// Recompute every point's observation list from the frames' feature
    /// associations.
    pub fn rebuild_observations(&mut self) {
        for point in &mut self.points {
            point.observations.clear();
        }
        for frame in self.segments.iter().flatten().flatten() {
            for feature in &frame.features {
                let Some(pid) = feature.feature3d else {
                    continue;
                };
                if let Some(point) = self.points.get_mut(pid.0) {
                    point.observations.push(FeatureRef {
                        timestamp: frame.timestamp,
                        camera: frame.camera,
                        index: feature.index,
                    });
                }
            }
        }
    }

    /// Check camera indices and association ranges.
    pub fn validate(&self) -> Result<()> {
        for (camera, segs) in self.segments.iter().enumerate() {
            for frame in segs.iter().flatten() {
                ensure!(
                    frame.camera == camera,
                    "frame at t={} stored under camera {} but tagged camera {}",
                    frame.timestamp,
                    camera,
                    frame.camera
                );
                for feature in &frame.features {
                    if let Some(pid) = feature.feature3d {
                        ensure!(
                            pid.0 < self.points.len(),
                            "feature {} of frame (camera {}, t={}) references point {} of {}",
                            feature.index,
                            camera,
                            frame.timestamp,
                            pid.0,
                            self.points.len()
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Descriptor, Keypoint, Point2DFeature, Pt3};

    fn graph() -> FrameGraph {
        let mut g = FrameGraph::new(2);
        let mut f = Point2DFeature::new(3, Keypoint::at(1.0, 2.0), Descriptor::Binary(vec![1]));
        f.feature3d = Some(PointId(0));
        g.segments[0].push(vec![Frame::new(0, 10, vec![f.clone()])]);
        g.segments[1].push(vec![Frame::new(1, 10, vec![f]), Frame::new(1, 20, Vec::new())]);
        g.points.push(Point3DFeature::new(Pt3::new(0.0, 0.0, 5.0)));
        g
    }

    #[test]
    fn frame_ids_cover_all_frames() {
        let g = graph();
        let ids: Vec<_> = g.frame_ids().collect();
        assert_eq!(ids.len(), g.frame_count());
        assert_eq!(ids.len(), 3);
        assert_eq!(g.frame(ids[2]).unwrap().timestamp, 20);
        assert!(g
            .frame(FrameId {
                camera: 1,
                segment: 0,
                frame: 5
            })
            .is_none());
    }

    #[test]
    fn observations_are_rebuilt_from_associations() {
        let mut g = graph();
        g.rebuild_observations();
        let obs = &g.points[0].observations;
        assert_eq!(obs.len(), 2);
        assert!(obs.contains(&FeatureRef {
            timestamp: 10,
            camera: 1,
            index: 3
        }));
        g.validate().unwrap();
    }

    #[test]
    fn validate_rejects_dangling_association() {
        let mut g = graph();
        g.points.clear();
        assert!(g.validate().is_err());
    }
}
