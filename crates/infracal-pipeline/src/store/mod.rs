//! Persistence of reference maps and calibration sessions.

pub mod frame_sets;
pub mod graph_format;

pub use frame_sets::{frame_sets_to_graph, graph_to_frame_sets};
pub use graph_format::{read_graph, read_graph_file, write_graph, write_graph_file, GraphIoError};
