use serde::{Deserialize, Serialize};

use crate::Pt3;

/// Detected keypoint in distorted pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub size: f32,
    #[serde(default)]
    pub angle: f32,
    #[serde(default)]
    pub response: f32,
    #[serde(default)]
    pub octave: i32,
}

impl Keypoint {
    /// Keypoint at `(x, y)` with all other attributes zeroed.
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            size: 0.0,
            angle: 0.0,
            response: 0.0,
            octave: 0,
        }
    }

    pub fn pixel(&self) -> crate::Vec2 {
        crate::Vec2::new(self.x, self.y)
    }
}

/// Element type of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorKind {
    Binary,
    Float,
}

/// Feature descriptor.
///
/// Binary descriptors are compared with the Hamming distance, float
/// descriptors with the L2 distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Descriptor {
    Binary(Vec<u8>),
    Float(Vec<f32>),
}

impl Descriptor {
    pub fn kind(&self) -> DescriptorKind {
        match self {
            Descriptor::Binary(_) => DescriptorKind::Binary,
            Descriptor::Float(_) => DescriptorKind::Float,
        }
    }

    /// Number of elements (bytes for binary, values for float).
    pub fn len(&self) -> usize {
        match self {
            Descriptor::Binary(d) => d.len(),
            Descriptor::Float(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Two descriptors can be compared only if kind and length agree.
    pub fn is_compatible(&self, other: &Descriptor) -> bool {
        self.kind() == other.kind() && self.len() == other.len()
    }

    /// Distance to `other`, or `None` for incompatible descriptors.
    pub fn distance(&self, other: &Descriptor) -> Option<f32> {
        match (self, other) {
            (Descriptor::Binary(a), Descriptor::Binary(b)) if a.len() == b.len() => Some(
                a.iter()
                    .zip(b)
                    .map(|(x, y)| (x ^ y).count_ones())
                    .sum::<u32>() as f32,
            ),
            (Descriptor::Float(a), Descriptor::Float(b)) if a.len() == b.len() => Some(
                a.iter()
                    .zip(b)
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f32>()
                    .sqrt(),
            ),
            _ => None,
        }
    }
}

/// Handle of a [`Point3DFeature`] inside an arena (a frame graph or a
/// [`crate::PointMap`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointId(pub usize);

/// Detected 2D feature of a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point2DFeature {
    pub keypoint: Keypoint,
    pub descriptor: Descriptor,
    /// Detection index; preserved when the owning frame prunes its features.
    pub index: usize,
    /// Associated 3D point, set at most once.
    #[serde(default)]
    pub feature3d: Option<PointId>,
}

impl Point2DFeature {
    pub fn new(index: usize, keypoint: Keypoint, descriptor: Descriptor) -> Self {
        Self {
            keypoint,
            descriptor,
            index,
            feature3d: None,
        }
    }
}

/// Non-owning reference from a 3D point to one of its observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureRef {
    pub timestamp: u64,
    pub camera: usize,
    /// Detection index of the observing [`Point2DFeature`].
    pub index: usize,
}

/// 3D point together with the features observing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point3DFeature {
    pub position: Pt3,
    /// Reference-map point this point was derived from.
    #[serde(default)]
    pub source: Option<PointId>,
    #[serde(default)]
    pub observations: Vec<FeatureRef>,
}

impl Point3DFeature {
    pub fn new(position: Pt3) -> Self {
        Self {
            position,
            source: None,
            observations: Vec::new(),
        }
    }
}
