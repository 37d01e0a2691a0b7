//! Conversion between session frame sets and the frame-graph structure.

use infracal_core::{Frame, FrameGraph, FrameSet, Point3DFeature};

/// One segment per camera holding its frames in arrival order, plus the
/// session points.
pub fn frame_sets_to_graph(frame_sets: &[FrameSet], camera_count: usize, points: &[Point3DFeature]) -> FrameGraph {
    let mut graph = FrameGraph::new(camera_count);
    for segments in &mut graph.segments {
        segments.push(Vec::new());
    }
    for frame in frame_sets.iter().flat_map(|set| set.frames.iter()) {
        if frame.camera >= camera_count {
            log::warn!(
                "dropping frame of camera {} (rig has {} cameras)",
                frame.camera,
                camera_count
            );
            continue;
        }
        graph.segments[frame.camera][0].push(frame.clone());
    }
    graph.points = points.to_vec();
    graph
}

/// Rebuild frame sets from segment 0 of every camera by merging on
/// ascending timestamp.
///
/// Frames sharing the smallest pending timestamp form one frame set.
pub fn graph_to_frame_sets(graph: &FrameGraph) -> Vec<FrameSet> {
    let segments: Vec<&[Frame]> = graph
        .segments
        .iter()
        .map(|segs| segs.first().map_or(&[][..], Vec::as_slice))
        .collect();
    let mut cursor = vec![0usize; segments.len()];
    let mut frame_sets = Vec::new();

    loop {
        let next = segments
            .iter()
            .zip(&cursor)
            .filter_map(|(frames, &pos)| frames.get(pos).map(|f| f.timestamp))
            .min();
        let Some(timestamp) = next else {
            break;
        };

        let mut frames = Vec::new();
        for (frames_of_camera, pos) in segments.iter().zip(cursor.iter_mut()) {
            if let Some(frame) = frames_of_camera.get(*pos) {
                if frame.timestamp == timestamp {
                    frames.push(frame.clone());
                    *pos += 1;
                }
            }
        }
        frame_sets.push(FrameSet::new(timestamp, frames));
    }
    frame_sets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(camera: usize, timestamp: u64) -> Frame {
        Frame::new(camera, timestamp, Vec::new())
    }

    #[test]
    fn merge_groups_equal_timestamps() {
        let mut graph = FrameGraph::new(3);
        graph.segments[0].push(vec![frame(0, 10), frame(0, 20), frame(0, 40)]);
        graph.segments[1].push(vec![frame(1, 10), frame(1, 30), frame(1, 40)]);
        graph.segments[2].push(vec![frame(2, 20), frame(2, 40)]);

        let sets = graph_to_frame_sets(&graph);
        let summary: Vec<(u64, Vec<usize>)> = sets
            .iter()
            .map(|s| (s.timestamp, s.cameras().collect()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (10, vec![0, 1]),
                (20, vec![0, 2]),
                (30, vec![1]),
                (40, vec![0, 1, 2]),
            ]
        );
    }

    #[test]
    fn camera_without_segments_is_skipped() {
        let mut graph = FrameGraph::new(2);
        graph.segments[0].push(vec![frame(0, 5)]);
        let sets = graph_to_frame_sets(&graph);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].len(), 1);
    }

    #[test]
    fn sets_roundtrip_through_graph() {
        let sets = vec![
            FrameSet::new(1, vec![frame(0, 1), frame(2, 1)]),
            FrameSet::new(2, vec![frame(0, 2), frame(1, 2), frame(2, 2)]),
        ];
        let graph = frame_sets_to_graph(&sets, 3, &[]);
        assert_eq!(graph.segments[1][0].len(), 1);
        assert_eq!(graph_to_frame_sets(&graph), sets);
    }
}
