//! Place recognition against the reference map.

use infracal_core::{Descriptor, DescriptorKind, Frame, FrameGraph, FrameId};
use nalgebra::DVector;

/// Retrieval index returning the reference frames most similar to a query.
pub trait PlaceRecognizer: Send + Sync {
    /// Index every frame of `reference`.
    fn setup(&mut self, reference: &FrameGraph);

    /// Up to `k` candidate frames, most similar first.
    fn knn_match(&self, frame: &Frame, k: usize) -> Vec<FrameId>;
}

/// Global-descriptor index.
///
/// Each frame is summarized by the mean of its float descriptors, or by the
/// per-bit set frequency of its binary descriptors. Summaries are centred on
/// the reference mean and L2-normalized; candidates are ranked by cosine
/// similarity.
#[derive(Debug, Clone, Default)]
pub struct DescriptorIndexRecognizer {
    layout: Option<(DescriptorKind, usize)>,
    mean: Option<DVector<f64>>,
    entries: Vec<(FrameId, DVector<f64>)>,
}

impl DescriptorIndexRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn summarize(descriptors: &[&Descriptor], layout: (DescriptorKind, usize)) -> Option<DVector<f64>> {
        let (kind, len) = layout;
        let dim = match kind {
            DescriptorKind::Binary => len * 8,
            DescriptorKind::Float => len,
        };
        let mut sum = DVector::<f64>::zeros(dim);
        let mut count = 0usize;
        for d in descriptors {
            match d {
                Descriptor::Float(values) if kind == DescriptorKind::Float && values.len() == len => {
                    for (acc, v) in sum.iter_mut().zip(values) {
                        *acc += *v as f64;
                    }
                }
                Descriptor::Binary(bytes) if kind == DescriptorKind::Binary && bytes.len() == len => {
                    for (byte_idx, byte) in bytes.iter().enumerate() {
                        for bit in 0..8 {
                            if byte & (1 << bit) != 0 {
                                sum[byte_idx * 8 + bit] += 1.0;
                            }
                        }
                    }
                }
                _ => continue,
            }
            count += 1;
        }
        (count > 0).then(|| sum / count as f64)
    }

    fn normalized(&self, mut v: DVector<f64>) -> DVector<f64> {
        if let Some(mean) = &self.mean {
            v -= mean;
        }
        let norm = v.norm();
        if norm > f64::EPSILON {
            v / norm
        } else {
            v
        }
    }
}

fn layout_of(frame: &Frame) -> Option<(DescriptorKind, usize)> {
    frame
        .features
        .first()
        .map(|f| (f.descriptor.kind(), f.descriptor.len()))
}

fn descriptors(frame: &Frame) -> Vec<&Descriptor> {
    frame.features.iter().map(|f| &f.descriptor).collect()
}

impl PlaceRecognizer for DescriptorIndexRecognizer {
    fn setup(&mut self, reference: &FrameGraph) {
        self.entries.clear();
        self.mean = None;
        self.layout = reference
            .frame_ids()
            .filter_map(|id| reference.frame(id))
            .find_map(layout_of);

        let Some(layout) = self.layout else {
            log::warn!("reference map has no features to index");
            return;
        };

        let raw: Vec<(FrameId, DVector<f64>)> = reference
            .frame_ids()
            .filter_map(|id| {
                let frame = reference.frame(id)?;
                Some((id, Self::summarize(&descriptors(frame), layout)?))
            })
            .collect();

        if let Some((_, first)) = raw.first() {
            let mut mean = DVector::zeros(first.len());
            for (_, v) in &raw {
                mean += v;
            }
            self.mean = Some(mean / raw.len() as f64);
        }

        let entries = raw
            .into_iter()
            .map(|(id, v)| (id, self.normalized(v)))
            .collect();
        self.entries = entries;
        log::debug!("indexed {} reference frames", self.entries.len());
    }

    fn knn_match(&self, frame: &Frame, k: usize) -> Vec<FrameId> {
        let Some(layout) = self.layout else {
            return Vec::new();
        };
        let Some(query) = Self::summarize(&descriptors(frame), layout) else {
            log::debug!(
                "camera {} t={}: no descriptors compatible with the index",
                frame.camera,
                frame.timestamp
            );
            return Vec::new();
        };
        let query = self.normalized(query);

        let mut scored: Vec<(f64, FrameId)> = self
            .entries
            .iter()
            .map(|(id, v)| (query.dot(v), *id))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().take(k).map(|(_, id)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infracal_core::{Keypoint, Point2DFeature};

    fn frame(camera: usize, descriptors: Vec<Descriptor>) -> Frame {
        let features = descriptors
            .into_iter()
            .enumerate()
            .map(|(i, d)| Point2DFeature::new(i, Keypoint::at(0.0, 0.0), d))
            .collect();
        Frame::new(camera, 0, features)
    }

    fn graph() -> FrameGraph {
        let mut graph = FrameGraph::new(1);
        graph.segments[0].push(vec![
            frame(0, vec![Descriptor::Float(vec![1.0, 0.0, 0.0])]),
            frame(0, vec![Descriptor::Float(vec![0.0, 1.0, 0.0])]),
            frame(0, vec![Descriptor::Float(vec![0.0, 0.0, 1.0])]),
        ]);
        graph
    }

    #[test]
    fn ranks_most_similar_frame_first() {
        let mut rec = DescriptorIndexRecognizer::new();
        rec.setup(&graph());
        assert_eq!(rec.len(), 3);

        let query = frame(
            0,
            vec![
                Descriptor::Float(vec![0.0, 0.9, 0.1]),
                Descriptor::Float(vec![0.1, 1.0, 0.0]),
            ],
        );
        let candidates = rec.knn_match(&query, 2);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].frame, 1);
    }

    #[test]
    fn binary_descriptors_use_bit_frequencies() {
        let mut graph = FrameGraph::new(1);
        graph.segments[0].push(vec![
            frame(0, vec![Descriptor::Binary(vec![0b0000_1111])]),
            frame(0, vec![Descriptor::Binary(vec![0b1111_0000])]),
        ]);
        let mut rec = DescriptorIndexRecognizer::new();
        rec.setup(&graph);

        let query = frame(0, vec![Descriptor::Binary(vec![0b1110_0000])]);
        assert_eq!(rec.knn_match(&query, 1)[0].frame, 1);
    }

    #[test]
    fn incompatible_query_returns_nothing() {
        let mut rec = DescriptorIndexRecognizer::new();
        rec.setup(&graph());
        let query = frame(0, vec![Descriptor::Binary(vec![1, 2, 3])]);
        assert!(rec.knn_match(&query, 3).is_empty());
    }
}
