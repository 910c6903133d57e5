//! Recording state management

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Phase of the recording subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingPhase {
    /// No recording in progress.
    Idle,
    /// Frames are being accepted and written.
    Recording,
    /// Tracks are marked finished; the container finalize is in flight.
    Finalizing,
}

impl Default for RecordingPhase {
    fn default() -> Self {
        Self::Idle
    }
}

/// Metadata for one in-progress recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingInfo {
    /// Output container path.
    pub output_path: PathBuf,

    /// Wall-clock start of the recording.
    pub started_at: DateTime<Utc>,

    /// Automatic stop deadline, if any.
    pub max_duration_ms: Option<u64>,
}

impl RecordingInfo {
    pub fn new(output_path: PathBuf, max_duration_ms: Option<u64>) -> Self {
        Self {
            output_path,
            started_at: Utc::now(),
            max_duration_ms,
        }
    }
}
