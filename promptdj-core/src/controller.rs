//! DjController: owns the prompt bank on the main thread and turns user and
//! MIDI input into engine commands.
//!
//! The bank is mutated here only; every change hands the engine a fresh
//! immutable snapshot.

use std::sync::Arc;

use promptdj_audio::EngineHandle;
use promptdj_types::{Prompt, PromptId, PromptSet};

use crate::midi::{bend_to_unit, cc_to_weight, MidiEvent, MidiEventKind};

/// The part of the engine the controller drives. Implemented by
/// `EngineHandle`; tests substitute a recorder.
pub trait EngineControl {
    fn set_weighted_prompts(&self, prompts: Arc<PromptSet>);
    fn set_pitch_bend(&self, value: f32);
}

impl EngineControl for EngineHandle {
    fn set_weighted_prompts(&self, prompts: Arc<PromptSet>) {
        EngineHandle::set_weighted_prompts(self, prompts);
    }

    fn set_pitch_bend(&self, value: f32) {
        EngineHandle::set_pitch_bend(self, value);
    }
}

/// What a MIDI event did.
#[derive(Debug, Clone, PartialEq)]
pub enum MidiOutcome {
    Ignored,
    Weight { prompt: PromptId, weight: f32 },
    PitchBend(f32),
    Learned { prompt: PromptId, controller: u8 },
}

pub struct DjController {
    prompts: PromptSet,
    /// Prompt waiting for the next CC to bind to.
    learning: Option<PromptId>,
}

impl DjController {
    pub fn new(prompts: PromptSet) -> Self {
        Self {
            prompts,
            learning: None,
        }
    }

    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    pub fn snapshot(&self) -> Arc<PromptSet> {
        Arc::new(self.prompts.clone())
    }

    /// Push the current bank to the engine.
    pub fn publish(&self, engine: &impl EngineControl) {
        engine.set_weighted_prompts(self.snapshot());
    }

    pub fn set_weight(&mut self, engine: &impl EngineControl, id: &PromptId, weight: f32) -> bool {
        let Some(prompt) = self.prompts.get_mut(id) else {
            return false;
        };
        prompt.set_weight(weight);
        self.publish(engine);
        true
    }

    pub fn set_text(&mut self, engine: &impl EngineControl, id: &PromptId, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let Some(prompt) = self.prompts.get_mut(id) else {
            return false;
        };
        prompt.text = text.to_string();
        self.publish(engine);
        true
    }

    /// Bind the next incoming CC to `id`.
    pub fn start_learn(&mut self, id: PromptId) -> bool {
        if self.prompts.get(&id).is_none() {
            return false;
        }
        self.learning = Some(id);
        true
    }

    pub fn cancel_learn(&mut self) {
        self.learning = None;
    }

    pub fn learning(&self) -> Option<&PromptId> {
        self.learning.as_ref()
    }

    pub fn handle_midi(&mut self, engine: &impl EngineControl, event: MidiEvent) -> MidiOutcome {
        match event.kind {
            MidiEventKind::ControlChange {
                controller, value, ..
            } => {
                if let Some(id) = self.learning.take() {
                    self.bind(&id, controller);
                    log::info!(target: "midi", "CC {} bound to {}", controller, id);
                    return MidiOutcome::Learned {
                        prompt: id,
                        controller,
                    };
                }
                let Some(id) = self.prompts.bound_to(controller).map(|p| p.prompt_id.clone())
                else {
                    return MidiOutcome::Ignored;
                };
                let weight = cc_to_weight(value);
                self.set_weight(engine, &id, weight);
                MidiOutcome::Weight { prompt: id, weight }
            }
            MidiEventKind::PitchBend { value, .. } => {
                let unit = bend_to_unit(value);
                engine.set_pitch_bend(unit);
                MidiOutcome::PitchBend(unit)
            }
        }
    }

    /// A CC drives at most one prompt.
    fn bind(&mut self, id: &PromptId, controller: u8) {
        let holders: Vec<PromptId> = self
            .prompts
            .iter()
            .filter(|p| p.controller_binding == Some(controller))
            .map(|p| p.prompt_id.clone())
            .collect();
        for holder in holders {
            if let Some(p) = self.prompts.get_mut(&holder) {
                p.controller_binding = None;
            }
        }
        if let Some(p) = self.prompts.get_mut(id) {
            p.controller_binding = Some(controller);
        }
    }

    /// Prompts in display order.
    pub fn ordered(&self) -> Vec<&Prompt> {
        let mut prompts: Vec<&Prompt> = self.prompts.iter().collect();
        prompts.sort_by_key(|p| {
            p.prompt_id
                .as_str()
                .rsplit('-')
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(usize::MAX)
        });
        prompts
    }
}
