//! Session-wide 3D point map.
//!
//! Correspondences found against the reference map refer to reference-map
//! points. Every reference point seen during a session resolves to exactly
//! one locally owned [`Point3DFeature`], regardless of how many frames or
//! cameras observe it, or in which order. Points live in an arena and are
//! addressed by [`PointId`]; the index keyed by the reference point id keeps
//! the merge identity-based.

use std::collections::HashMap;

use crate::{FeatureRef, Point3DFeature, PointId, Pt3};

#[derive(Debug, Clone, Default)]
pub struct PointMap {
    points: Vec<Point3DFeature>,
    by_source: HashMap<PointId, PointId>,
}

impl PointMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a map from stored points; points with a `source` become
    /// addressable through [`PointMap::lookup`] again.
    pub fn from_points(points: Vec<Point3DFeature>) -> Self {
        let by_source = points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.source.map(|src| (src, PointId(i))))
            .collect();
        Self { points, by_source }
    }

    /// Local point for reference point `source`, created at `position` on
    /// first use. Later calls with the same `source` return the same id and
    /// ignore `position`.
    pub fn get_or_insert(&mut self, source: PointId, position: Pt3) -> PointId {
        if let Some(&id) = self.by_source.get(&source) {
            return id;
        }
        let id = PointId(self.points.len());
        self.points.push(Point3DFeature {
            position,
            source: Some(source),
            observations: Vec::new(),
        });
        self.by_source.insert(source, id);
        id
    }

    /// Append an observation to point `id`. Returns `false` for an unknown id.
    pub fn observe(&mut self, id: PointId, feature: FeatureRef) -> bool {
        match self.points.get_mut(id.0) {
            Some(point) => {
                point.observations.push(feature);
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, source: PointId) -> Option<PointId> {
        self.by_source.get(&source).copied()
    }

    pub fn get(&self, id: PointId) -> Option<&Point3DFeature> {
        self.points.get(id.0)
    }

    pub fn get_mut(&mut self, id: PointId) -> Option<&mut Point3DFeature> {
        self.points.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PointId, &Point3DFeature)> {
        self.points.iter().enumerate().map(|(i, p)| (PointId(i), p))
    }

    pub fn points(&self) -> &[Point3DFeature] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Point3DFeature> {
        self.points
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.by_source.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(camera: usize, timestamp: u64, index: usize) -> FeatureRef {
        FeatureRef {
            timestamp,
            camera,
            index,
        }
    }

    #[test]
    fn same_source_yields_one_point() {
        let mut map = PointMap::new();
        let a = map.get_or_insert(PointId(42), Pt3::new(1.0, 2.0, 3.0));
        let b = map.get_or_insert(PointId(42), Pt3::new(9.0, 9.0, 9.0));
        assert_eq!(a, b);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(a).unwrap().position, Pt3::new(1.0, 2.0, 3.0));

        assert!(map.observe(a, obs(0, 1, 0)));
        assert!(map.observe(b, obs(1, 1, 4)));
        assert_eq!(map.get(a).unwrap().observations.len(), 2);
        assert!(!map.observe(PointId(7), obs(0, 0, 0)));
    }

    #[test]
    fn contents_do_not_depend_on_insertion_order() {
        let events = [
            (PointId(3), obs(0, 1, 0)),
            (PointId(5), obs(1, 1, 2)),
            (PointId(3), obs(2, 1, 7)),
            (PointId(5), obs(0, 2, 1)),
        ];
        let build = |order: &[usize]| {
            let mut map = PointMap::new();
            for &i in order {
                let (src, f) = events[i];
                let id = map.get_or_insert(src, Pt3::new(src.0 as f64, 0.0, 0.0));
                map.observe(id, f);
            }
            let mut summary: Vec<_> = map
                .iter()
                .map(|(_, p)| {
                    let mut o = p.observations.clone();
                    o.sort_by_key(|f| (f.camera, f.timestamp, f.index));
                    (p.source, o)
                })
                .collect();
            summary.sort_by_key(|(src, _)| *src);
            summary
        };
        assert_eq!(build(&[0, 1, 2, 3]), build(&[3, 2, 1, 0]));
    }

    #[test]
    fn from_points_restores_identity_index() {
        let mut map = PointMap::new();
        let id = map.get_or_insert(PointId(11), Pt3::origin());
        let restored = PointMap::from_points(map.clone().into_points());
        assert_eq!(restored.lookup(PointId(11)), Some(id));

        let mut restored = restored;
        assert_eq!(restored.get_or_insert(PointId(11), Pt3::new(1.0, 0.0, 0.0)), id);
        restored.clear();
        assert!(restored.is_empty());
        assert!(restored.lookup(PointId(11)).is_none());
    }
}
