//! Audio clock: frames rendered since the output started, shared between
//! the render callback (sole writer) and the engine (reader).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use promptdj_types::SAMPLE_RATE;

#[derive(Debug, Clone, Default)]
pub struct AudioClock {
    frames: Arc<AtomicU64>,
}

impl AudioClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Current audio time in seconds.
    pub fn now(&self) -> f64 {
        frames_to_secs(self.frames())
    }

    pub(crate) fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    /// Move the clock to an absolute time. Only meaningful for clocks that
    /// no render callback is driving.
    pub fn set_secs(&self, secs: f64) {
        self.frames.store(secs_to_frames(secs), Ordering::Release);
    }
}

pub fn secs_to_frames(secs: f64) -> u64 {
    if secs <= 0.0 {
        0
    } else {
        (secs * SAMPLE_RATE as f64).round() as u64
    }
}

pub fn frames_to_secs(frames: u64) -> f64 {
    frames as f64 / SAMPLE_RATE as f64
}
