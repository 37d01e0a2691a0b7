//! Operation log of a calibration session.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    LoadMap,
    AddFrameSet,
    Initialize,
    Optimize,
    LoadFrameSets,
    SaveFrameSets,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::LoadMap => "load_map",
            Operation::AddFrameSet => "add_frame_set",
            Operation::Initialize => "initialize",
            Operation::Optimize => "optimize",
            Operation::LoadFrameSets => "load_frame_sets",
            Operation::SaveFrameSets => "save_frame_sets",
        };
        f.write_str(name)
    }
}

/// Lightweight audit trail entry; not meant for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unix timestamp of the operation (seconds since epoch).
    pub timestamp: u64,
    pub operation: Operation,
    pub success: bool,
    /// Optional notes or error message.
    pub notes: Option<String>,
}

impl LogEntry {
    pub fn success(operation: Operation) -> Self {
        Self {
            timestamp: current_timestamp(),
            operation,
            success: true,
            notes: None,
        }
    }

    pub fn success_with_notes(operation: Operation, notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Self::success(operation)
        }
    }

    pub fn failure(operation: Operation, error: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            operation,
            success: false,
            notes: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_serialize_with_operation_name() {
        let entry = LogEntry::failure(Operation::LoadMap, "missing file");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("LoadMap") && json.contains("missing file"), "{}", json);
        assert!(!entry.success);
        assert_eq!(Operation::SaveFrameSets.to_string(), "save_frame_sets");
    }
}
