//! Calibration problem builders.

pub mod infrastructure;
