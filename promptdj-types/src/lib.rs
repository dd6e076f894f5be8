//! # promptdj-types
//!
//! Shared type definitions for the promptdj workspace.
//! This crate contains the data model used across promptdj-net,
//! promptdj-audio and promptdj-core: prompts, playback state, EQ settings and
//! the events the engine emits.

mod event;
mod playback;
mod prompt;

pub use event::{EngineEvent, RecordingArtifact};
pub use playback::{EqGains, PlaybackState, EQ_GAIN_LIMIT_DB};
pub use prompt::{FilteredTextSet, Prompt, PromptSet, WeightedPrompt, MAX_PROMPT_WEIGHT};

/// Unique identifier for a prompt.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct PromptId(String);

impl PromptId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PromptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sample rate the engine renders and decodes at.
pub const SAMPLE_RATE: u32 = 48_000;

/// Channel count of decoded and rendered audio (interleaved stereo).
pub const CHANNELS: u16 = 2;
