//! Render-side signal graph.
//!
//! Fixed topology:
//! output gain stage(s) → low shelf → mid peak → high shelf → master gain →
//! {primary output, taps}
//!
//! The engine never touches the graph directly. It sends `RenderCmd`s, which
//! the render callback applies at the start of each block, in order. Times
//! are absolute frames on the shared `AudioClock`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use log::debug;

use promptdj_types::{EqGains, CHANNELS};

use crate::clock::AudioClock;
use crate::decoder::PcmBuffer;
use crate::eq::EqChain;

/// Rendered master output, interleaved stereo.
pub type Block = Arc<[f32]>;

/// Commands from the engine to the render callback.
#[derive(Debug)]
pub enum RenderCmd {
    /// Start advancing the clock. The graph starts suspended.
    Resume,
    /// Play `buffer` from `start_frame` on the current gain stage.
    Schedule { start_frame: u64, buffer: PcmBuffer },
    /// Linear ramp on the current gain stage from `from` (or the value it
    /// has at `start_frame`) to `to`.
    Fade {
        from: Option<f32>,
        to: f32,
        start_frame: u64,
        end_frame: u64,
    },
    /// Retire the current gain stage (it keeps rendering until silent) and
    /// route further scheduling to a fresh one at unity gain.
    ReplaceGainStage,
    SetEq(EqGains),
    SetMaster(f32),
    AttachTap { id: u64, tx: Sender<Block> },
    DetachTap { id: u64 },
}

/// Peak level of the last rendered block, readable from any thread.
#[derive(Debug, Clone, Default)]
pub struct OutputMeter {
    peak_bits: Arc<AtomicU32>,
}

impl OutputMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak_bits.load(Ordering::Relaxed))
    }

    fn publish(&self, peak: f32) {
        self.peak_bits.store(peak.to_bits(), Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy)]
struct Ramp {
    start_frame: u64,
    start_value: f32,
    end_frame: u64,
    target: f32,
}

/// Gain with a single pending linear ramp.
#[derive(Debug, Clone)]
struct GainParam {
    value: f32,
    ramp: Option<Ramp>,
}

impl GainParam {
    fn new(value: f32) -> Self {
        Self { value, ramp: None }
    }

    fn value_at(&self, frame: u64) -> f32 {
        match self.ramp {
            None => self.value,
            Some(r) if frame < r.start_frame => self.value,
            Some(r) if frame >= r.end_frame => r.target,
            Some(r) => {
                let span = (r.end_frame - r.start_frame) as f32;
                let t = (frame - r.start_frame) as f32 / span;
                r.start_value + (r.target - r.start_value) * t
            }
        }
    }

    fn fade(&mut self, from: Option<f32>, to: f32, start_frame: u64, end_frame: u64) {
        let start_value = from.unwrap_or_else(|| self.value_at(start_frame));
        self.value = start_value;
        self.ramp = if end_frame > start_frame {
            Some(Ramp {
                start_frame,
                start_value,
                end_frame,
                target: to,
            })
        } else {
            self.value = to;
            None
        };
    }

    /// Fold a finished ramp into the static value.
    fn settle(&mut self, frame: u64) {
        if let Some(r) = self.ramp {
            if frame >= r.end_frame {
                self.value = r.target;
                self.ramp = None;
            }
        }
    }

    fn is_silent_from(&self, frame: u64) -> bool {
        match self.ramp {
            None => self.value == 0.0,
            Some(r) => frame >= r.end_frame && r.target == 0.0,
        }
    }
}

#[derive(Debug)]
struct Source {
    start_frame: u64,
    buffer: PcmBuffer,
}

impl Source {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.buffer.frames() as u64
    }
}

/// A gain stage and the sources bound to it.
#[derive(Debug)]
struct GainStage {
    gain: GainParam,
    sources: Vec<Source>,
}

impl GainStage {
    fn new() -> Self {
        Self {
            gain: GainParam::new(1.0),
            sources: Vec::new(),
        }
    }

    /// Mix this stage's sources for `[frame, frame + frames)` into `out`.
    fn render(&mut self, frame: u64, frames: usize, scratch: &mut Vec<f32>, out: &mut [f32]) {
        let channels = CHANNELS as usize;
        scratch.clear();
        scratch.resize(frames * channels, 0.0);

        let block_end = frame + frames as u64;
        for source in &self.sources {
            if source.start_frame >= block_end || source.end_frame() <= frame {
                continue;
            }
            let from = source.start_frame.max(frame);
            let to = source.end_frame().min(block_end);
            let src_offset = (from - source.start_frame) as usize * channels;
            let dst_offset = (from - frame) as usize * channels;
            let len = (to - from) as usize * channels;
            let samples = &source.buffer.samples()[src_offset..src_offset + len];
            for (dst, src) in scratch[dst_offset..dst_offset + len].iter_mut().zip(samples) {
                *dst += *src;
            }
        }
        self.sources.retain(|s| s.end_frame() > block_end);

        for (i, pair) in scratch.chunks_exact(channels).enumerate() {
            let g = self.gain.value_at(frame + i as u64);
            for (ch, sample) in pair.iter().enumerate() {
                out[i * channels + ch] += sample * g;
            }
        }
        self.gain.settle(block_end);
    }
}

/// Everything the render callback owns.
pub struct SignalGraph {
    clock: AudioClock,
    meter: OutputMeter,
    suspended: bool,
    current: GainStage,
    retiring: Vec<GainStage>,
    eq: EqChain,
    master: f32,
    taps: Vec<(u64, Sender<Block>)>,
    scratch: Vec<f32>,
}

impl SignalGraph {
    pub fn new(clock: AudioClock, meter: OutputMeter) -> Self {
        Self {
            clock,
            meter,
            suspended: true,
            current: GainStage::new(),
            retiring: Vec::new(),
            eq: EqChain::new(),
            master: 1.0,
            taps: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn clock(&self) -> &AudioClock {
        &self.clock
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn apply(&mut self, cmd: RenderCmd) {
        match cmd {
            RenderCmd::Resume => self.suspended = false,
            RenderCmd::Schedule { start_frame, buffer } => {
                self.current.sources.push(Source { start_frame, buffer });
            }
            RenderCmd::Fade {
                from,
                to,
                start_frame,
                end_frame,
            } => self.current.gain.fade(from, to, start_frame, end_frame),
            RenderCmd::ReplaceGainStage => {
                let old = std::mem::replace(&mut self.current, GainStage::new());
                self.retiring.push(old);
            }
            RenderCmd::SetEq(gains) => self.eq.set_gains(gains),
            RenderCmd::SetMaster(level) => self.master = level.clamp(0.0, 1.0),
            RenderCmd::AttachTap { id, tx } => self.taps.push((id, tx)),
            RenderCmd::DetachTap { id } => self.taps.retain(|(tap, _)| *tap != id),
        }
    }

    /// Render `out.len() / 2` frames of interleaved stereo.
    pub fn process(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        if self.suspended {
            self.meter.publish(0.0);
            return;
        }

        let frames = out.len() / CHANNELS as usize;
        let frame = self.clock.frames();

        for stage in self.retiring.iter_mut() {
            stage.render(frame, frames, &mut self.scratch, out);
        }
        self.current.render(frame, frames, &mut self.scratch, out);

        let block_end = frame + frames as u64;
        let before = self.retiring.len();
        self.retiring
            .retain(|s| !s.sources.is_empty() && !s.gain.is_silent_from(block_end));
        if self.retiring.len() != before {
            debug!(target: "render", "released {} gain stage(s)", before - self.retiring.len());
        }

        self.eq.process(out);

        let mut peak = 0.0f32;
        for sample in out.iter_mut() {
            *sample *= self.master;
            peak = peak.max(sample.abs());
        }
        self.meter.publish(peak);

        if !self.taps.is_empty() {
            let block: Block = Arc::from(&out[..]);
            self.taps.retain(|(_, tx)| tx.send(Arc::clone(&block)).is_ok());
        }

        self.clock.advance(frames as u64);
    }

    pub fn eq_gains(&self) -> EqGains {
        self.eq.gains()
    }

    pub fn master(&self) -> f32 {
        self.master
    }

    pub fn scheduled_sources(&self) -> usize {
        self.current.sources.len() + self.retiring.iter().map(|s| s.sources.len()).sum::<usize>()
    }

    pub fn retiring_stages(&self) -> usize {
        self.retiring.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptdj_types::SAMPLE_RATE;

    fn graph() -> SignalGraph {
        let mut g = SignalGraph::new(AudioClock::new(), OutputMeter::new());
        g.apply(RenderCmd::Resume);
        g
    }

    fn constant(frames: usize, value: f32) -> PcmBuffer {
        PcmBuffer::from_interleaved(vec![value; frames * 2])
    }

    #[test]
    fn suspended_graph_holds_the_clock() {
        let mut g = SignalGraph::new(AudioClock::new(), OutputMeter::new());
        let mut out = vec![1.0; 64];
        g.process(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(g.clock().frames(), 0);
    }

    #[test]
    fn source_starts_at_its_frame() {
        let mut g = graph();
        g.apply(RenderCmd::Schedule {
            start_frame: 10,
            buffer: constant(4, 0.5),
        });

        let mut out = vec![0.0; 32];
        g.process(&mut out);
        let left: Vec<f32> = out.iter().step_by(2).copied().collect();
        assert!(left[..10].iter().all(|s| *s == 0.0));
        assert!(left[10..14].iter().all(|s| (*s - 0.5).abs() < 1e-6));
        assert!(left[14..].iter().all(|s| *s == 0.0));
        assert_eq!(g.scheduled_sources(), 0);
    }

    #[test]
    fn back_to_back_sources_leave_no_gap() {
        let mut g = graph();
        g.apply(RenderCmd::Schedule {
            start_frame: 0,
            buffer: constant(5, 0.25),
        });
        g.apply(RenderCmd::Schedule {
            start_frame: 5,
            buffer: constant(5, 0.25),
        });

        let mut out = vec![0.0; 20];
        g.process(&mut out);
        assert!(out.iter().all(|s| (*s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn fade_ramps_linearly() {
        let mut g = graph();
        g.apply(RenderCmd::Schedule {
            start_frame: 0,
            buffer: constant(200, 1.0),
        });
        g.apply(RenderCmd::Fade {
            from: Some(0.0),
            to: 1.0,
            start_frame: 0,
            end_frame: 100,
        });

        let mut out = vec![0.0; 400];
        g.process(&mut out);
        assert_eq!(out[0], 0.0);
        assert!((out[100] - 0.5).abs() < 1e-3);
        assert!((out[300] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn fade_without_start_value_uses_current_level() {
        let mut g = graph();
        g.apply(RenderCmd::Schedule {
            start_frame: 0,
            buffer: constant(300, 1.0),
        });
        g.apply(RenderCmd::Fade {
            from: Some(0.5),
            to: 0.5,
            start_frame: 0,
            end_frame: 1,
        });
        let mut out = vec![0.0; 200];
        g.process(&mut out);

        g.apply(RenderCmd::Fade {
            from: None,
            to: 0.0,
            start_frame: 100,
            end_frame: 200,
        });
        let mut out = vec![0.0; 200];
        g.process(&mut out);
        assert!((out[0] - 0.5).abs() < 1e-3);
        assert!((out[100] - 0.25).abs() < 1e-2);
    }

    #[test]
    fn replaced_stage_fades_out_then_releases() {
        let mut g = graph();
        g.apply(RenderCmd::Schedule {
            start_frame: 0,
            buffer: constant(SAMPLE_RATE as usize, 1.0),
        });
        g.apply(RenderCmd::Fade {
            from: Some(1.0),
            to: 0.0,
            start_frame: 0,
            end_frame: 100,
        });
        g.apply(RenderCmd::ReplaceGainStage);
        g.apply(RenderCmd::Schedule {
            start_frame: 50,
            buffer: constant(10, 0.5),
        });

        let mut out = vec![0.0; 256];
        g.process(&mut out);
        assert_eq!(g.retiring_stages(), 0);
        // New stage is at unity and unaffected by the old fade.
        assert!((out[55 * 2] - (0.5 + 0.45)).abs() < 1e-2);
        assert_eq!(out[120 * 2], 0.0);
    }

    #[test]
    fn master_gain_and_meter() {
        let clock = AudioClock::new();
        let meter = OutputMeter::new();
        let mut g = SignalGraph::new(clock, meter.clone());
        g.apply(RenderCmd::Resume);
        g.apply(RenderCmd::SetMaster(0.5));
        g.apply(RenderCmd::Schedule {
            start_frame: 0,
            buffer: constant(8, 0.8),
        });

        let mut out = vec![0.0; 16];
        g.process(&mut out);
        assert!((out[0] - 0.4).abs() < 1e-6);
        assert!((meter.peak() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn taps_receive_master_blocks_until_detached() {
        let mut g = graph();
        let (tx, rx) = crossbeam_channel::unbounded();
        g.apply(RenderCmd::AttachTap { id: 1, tx });
        g.apply(RenderCmd::Schedule {
            start_frame: 0,
            buffer: constant(8, 0.1),
        });

        let mut out = vec![0.0; 16];
        g.process(&mut out);
        let block = rx.try_recv().unwrap();
        assert_eq!(&block[..], &out[..]);

        g.apply(RenderCmd::DetachTap { id: 1 });
        g.process(&mut out);
        assert!(rx.try_recv().is_err());
    }
}
