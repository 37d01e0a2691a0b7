//! Deterministic synthetic infrastructure scenes.
//!
//! Building blocks for tests and demos:
//! - a corridor of 3D points with per-point float descriptors,
//! - a three-camera rig and a rig trajectory,
//! - projection of the scene into rig cameras, producing frames whose
//!   features are associated with the scene points (a reference map),
//! - deterministic pixel noise keyed by `(frame, point)`.
//!
//! Everything is seeded explicitly and does not depend on the internal
//! algorithm of `rand` RNGs, so datasets are stable across versions.

pub mod infrastructure;
pub mod noise;
