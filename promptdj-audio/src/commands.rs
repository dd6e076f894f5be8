//! Commands from the main thread to the engine thread.

use std::sync::Arc;

use crossbeam_channel::Sender;

use promptdj_types::{EqGains, PromptSet};

use crate::graph::Block;

#[derive(Debug)]
pub enum EngineCmd {
    Play,
    Pause,
    Stop,
    PlayPause,
    SetWeightedPrompts(Arc<PromptSet>),
    SetPitchBend(f32),
    SetEqGains(EqGains),
    SetMasterVolume(f32),
    StartRecording,
    StopRecording,
    /// Extra destination: receives every rendered master block until the
    /// receiver is dropped.
    AttachOutput(Sender<Block>),
    Shutdown,
}

impl EngineCmd {
    /// Transport and controller moves go ahead of everything else.
    pub fn is_priority(&self) -> bool {
        matches!(
            self,
            EngineCmd::Play
                | EngineCmd::Pause
                | EngineCmd::Stop
                | EngineCmd::PlayPause
                | EngineCmd::SetPitchBend(_)
        )
    }
}
