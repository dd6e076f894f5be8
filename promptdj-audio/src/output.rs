//! Output destinations that drive the signal graph.
//!
//! `render_link` splits the graph into the engine-side `RenderLink` (command
//! sender, clock, meter) and the render-side `Renderer`. A `Renderer` is
//! driven by a cpal output stream, by a paced thread when no device is
//! wanted, or directly by tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use log::{error, info, warn};

use promptdj_types::{CHANNELS, SAMPLE_RATE};

use crate::clock::AudioClock;
use crate::graph::{OutputMeter, RenderCmd, SignalGraph};

/// Engine side of the render path.
#[derive(Clone)]
pub struct RenderLink {
    pub tx: Sender<RenderCmd>,
    pub clock: AudioClock,
    pub meter: OutputMeter,
}

/// Render side: the graph plus its command queue.
pub struct Renderer {
    graph: SignalGraph,
    rx: Receiver<RenderCmd>,
}

pub fn render_link() -> (RenderLink, Renderer) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let clock = AudioClock::new();
    let meter = OutputMeter::new();
    let graph = SignalGraph::new(clock.clone(), meter.clone());
    (RenderLink { tx, clock, meter }, Renderer { graph, rx })
}

impl Renderer {
    /// Apply queued commands, then render one interleaved stereo block.
    pub fn render(&mut self, out: &mut [f32]) {
        for cmd in self.rx.try_iter() {
            self.graph.apply(cmd);
        }
        self.graph.process(out);
    }

    /// Render `frames` frames into a new buffer.
    pub fn render_frames(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * CHANNELS as usize];
        self.render(&mut out);
        out
    }

    pub fn graph(&self) -> &SignalGraph {
        &self.graph
    }
}

/// Primary destination on a cpal output device.
///
/// The stream is not `Send` on every host, so this must stay on the thread
/// that opened it.
pub struct DeviceOutput {
    _stream: Stream,
    device_name: String,
}

impl DeviceOutput {
    /// Open `device` (or the host default) at 48 kHz stereo and start it.
    pub fn open(mut renderer: Renderer, device: Option<&str>) -> Result<Self, String> {
        let host = cpal::default_host();
        let device = match device {
            Some(name) => find_output_device(&host, name)?,
            None => host
                .default_output_device()
                .ok_or_else(|| "No output device available".to_string())?,
        };
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let config = StreamConfig {
            channels: CHANNELS,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    renderer.render(data);
                },
                |err| {
                    error!(target: "render", "output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| format!("Failed to build output stream: {}", e))?;

        stream
            .play()
            .map_err(|e| format!("Failed to start output stream: {}", e))?;

        info!(target: "render", "output on {}", device_name);
        Ok(Self {
            _stream: stream,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

fn find_output_device(host: &cpal::Host, name: &str) -> Result<Device, String> {
    let devices = host
        .output_devices()
        .map_err(|e| format!("Failed to list output devices: {}", e))?;
    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(format!("Output device not found: {}", name))
}

/// Names of the host's output devices.
pub fn output_device_names() -> Vec<String> {
    cpal::default_host()
        .output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Drives a `Renderer` in real time without a device. Rendered audio only
/// reaches taps.
pub struct NullOutput {
    running: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl NullOutput {
    const BLOCK: Duration = Duration::from_millis(10);

    pub fn spawn(mut renderer: Renderer) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let frames = (SAMPLE_RATE as u64 * Self::BLOCK.as_millis() as u64 / 1000) as usize;

        let join_handle = thread::Builder::new()
            .name("promptdj-null-output".to_string())
            .spawn(move || {
                let mut block = vec![0.0f32; frames * CHANNELS as usize];
                let mut next = Instant::now();
                while flag.load(Ordering::Relaxed) {
                    renderer.render(&mut block);
                    next += Self::BLOCK;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else if now - next > Self::BLOCK * 10 {
                        warn!(target: "render", "null output fell behind, resyncing");
                        next = now;
                    }
                }
            })?;

        info!(target: "render", "no output device, rendering to taps only");
        Ok(Self {
            running,
            join_handle: Some(join_handle),
        })
    }
}

impl Drop for NullOutput {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::PcmBuffer;

    #[test]
    fn renderer_applies_queued_commands_before_rendering() {
        let (link, mut renderer) = render_link();
        link.tx.send(RenderCmd::Resume).unwrap();
        link.tx
            .send(RenderCmd::Schedule {
                start_frame: 0,
                buffer: PcmBuffer::from_interleaved(vec![0.5; 16]),
            })
            .unwrap();

        let out = renderer.render_frames(8);
        assert!(out.iter().all(|s| (*s - 0.5).abs() < 1e-6));
        assert_eq!(link.clock.frames(), 8);
        assert!((link.meter.peak() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn null_output_advances_the_clock_once_resumed() {
        let (link, renderer) = render_link();
        let output = NullOutput::spawn(renderer).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(link.clock.frames(), 0);

        link.tx.send(RenderCmd::Resume).unwrap();
        thread::sleep(Duration::from_millis(60));
        drop(output);
        assert!(link.clock.frames() > 0);
    }
}
