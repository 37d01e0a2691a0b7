//! Session data model.
//!
//! Features, frames and frame graphs are plain owned data. Relations that the
//! tracking pipeline needs in both directions (2D feature to 3D point, 3D
//! point to observing features) are stored as indices ([`PointId`],
//! [`FeatureRef`]) instead of references.

mod feature;
mod frame;
mod graph;

pub use feature::*;
pub use frame::*;
pub use graph::*;
