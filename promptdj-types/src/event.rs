//! Notifications emitted by the playback engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::PlaybackState;

/// A finished recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingArtifact {
    pub path: PathBuf,
    /// Negotiated format name, e.g. `wav-f32`.
    pub format: String,
    pub frames: u64,
}

/// Feedback messages from the engine thread to the main thread.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PlaybackStateChanged(PlaybackState),
    /// The service refused a prompt text; it is excluded from now on.
    FilteredPrompt(String),
    /// Human-readable failure. Fatal conditions have already stopped playback.
    Error(String),
    RecordingStarted {
        format: String,
    },
    RecordingFinished(RecordingArtifact),
    /// Periodic scheduling summary.
    ScheduleSummary {
        /// Average lead between scheduling and playout, in milliseconds
        avg_lead_ms: u32,
        /// Smallest lead in the window
        min_lead_ms: u32,
        /// Cumulative underrun count
        underruns: u64,
    },
}
