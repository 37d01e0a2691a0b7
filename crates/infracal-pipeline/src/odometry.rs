//! Planar odometry distance bookkeeping.

use serde::{Deserialize, Serialize};

/// Accumulated planar travel distance of the rig.
///
/// Successive samples add `hypot(dx, dy)`, except while the last recorded
/// position is exactly `(0, 0)`: that position stands for "no sample yet",
/// so a sample following a genuine `(0, 0)` position adds nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OdometryDistance {
    last_x: f64,
    last_y: f64,
    distance: f64,
}

impl OdometryDistance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample. `yaw` and `timestamp` are accepted for interface
    /// parity with odometry sources and are not used.
    pub fn add(&mut self, x: f64, y: f64, _yaw: f64, _timestamp: u64) {
        if self.last_x != 0.0 || self.last_y != 0.0 {
            self.distance += (x - self.last_x).hypot(y - self.last_y);
        }
        self.last_x = x;
        self.last_y = y;
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
