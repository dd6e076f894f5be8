//! Recorder: taps the master output and writes it to a WAV file.
//!
//! The writer thread owns the hound writer. Blocks arrive over the tap
//! channel while the graph renders; `stop` drains what is left, finalizes
//! the file and hands back the artifact.

use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info};

use promptdj_types::{RecordingArtifact, CHANNELS, SAMPLE_RATE};

use crate::graph::Block;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingFormat {
    WavF32,
    WavI16,
}

impl RecordingFormat {
    pub const SUPPORTED: [RecordingFormat; 2] = [RecordingFormat::WavF32, RecordingFormat::WavI16];

    pub fn name(&self) -> &'static str {
        match self {
            Self::WavF32 => "wav-f32",
            Self::WavI16 => "wav-i16",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::SUPPORTED
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name.trim()))
    }

    /// First supported entry of `preferences`.
    pub fn negotiate<S: AsRef<str>>(preferences: &[S]) -> Result<Self, RecorderError> {
        preferences
            .iter()
            .find_map(|p| Self::parse(p.as_ref()))
            .ok_or_else(|| {
                RecorderError::UnsupportedFormat(
                    preferences.iter().map(|p| p.as_ref().to_string()).collect(),
                )
            })
    }

    fn wav_spec(&self) -> hound::WavSpec {
        let (bits_per_sample, sample_format) = match self {
            Self::WavF32 => (32, hound::SampleFormat::Float),
            Self::WavI16 => (16, hound::SampleFormat::Int),
        };
        hound::WavSpec {
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            bits_per_sample,
            sample_format,
        }
    }
}

impl fmt::Display for RecordingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub enum RecorderError {
    UnsupportedFormat(Vec<String>),
    AlreadyRecording,
    NotRecording,
    Io(std::io::Error),
    Wav(hound::Error),
    WriterPanicked,
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFormat(asked) if asked.is_empty() => {
                write!(f, "no recording format configured")
            }
            Self::UnsupportedFormat(asked) => {
                write!(f, "none of the recording formats are supported: {}", asked.join(", "))
            }
            Self::AlreadyRecording => write!(f, "already recording"),
            Self::NotRecording => write!(f, "not recording"),
            Self::Io(e) => write!(f, "recording I/O error: {}", e),
            Self::Wav(e) => write!(f, "WAV encoder error: {}", e),
            Self::WriterPanicked => write!(f, "recording writer thread panicked"),
        }
    }
}

impl std::error::Error for RecorderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Wav(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RecorderError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<hound::Error> for RecorderError {
    fn from(e: hound::Error) -> Self {
        Self::Wav(e)
    }
}

/// `promptdj-<unix-seconds>.wav` inside `dir`, or `promptdj-<secs>-<n>.wav`
/// when an earlier recording already took that name.
pub fn artifact_path(dir: &Path) -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut path = dir.join(format!("promptdj-{}.wav", secs));
    let mut n = 1u32;
    while path.exists() {
        path = dir.join(format!("promptdj-{}-{}.wav", secs, n));
        n += 1;
    }
    path
}

type Writer = hound::WavWriter<BufWriter<File>>;

struct WriterState {
    writer: Writer,
    format: RecordingFormat,
    frames: u64,
}

impl WriterState {
    fn write_block(&mut self, block: &[f32]) -> Result<(), RecorderError> {
        match self.format {
            RecordingFormat::WavF32 => {
                for &s in block {
                    self.writer.write_sample(s)?;
                }
            }
            RecordingFormat::WavI16 => {
                for &s in block {
                    self.writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
                }
            }
        }
        self.frames += (block.len() / CHANNELS as usize) as u64;
        Ok(())
    }
}

/// An active recording.
pub struct Recorder {
    path: PathBuf,
    format: RecordingFormat,
    stop_tx: Option<Sender<()>>,
    join_handle: Option<JoinHandle<Result<u64, RecorderError>>>,
}

impl Recorder {
    /// Create the output file and start draining `blocks` into it.
    pub fn start(
        path: PathBuf,
        format: RecordingFormat,
        blocks: Receiver<Block>,
    ) -> Result<Self, RecorderError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let writer = hound::WavWriter::create(&path, format.wav_spec())?;
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let mut state = WriterState {
            writer,
            format,
            frames: 0,
        };
        let join_handle = thread::Builder::new()
            .name("promptdj-recorder".to_string())
            .spawn(move || -> Result<u64, RecorderError> {
                loop {
                    crossbeam_channel::select! {
                        recv(blocks) -> block => match block {
                            Ok(block) => state.write_block(&block)?,
                            Err(_) => break,
                        },
                        recv(stop_rx) -> _ => {
                            for block in blocks.try_iter() {
                                state.write_block(&block)?;
                            }
                            break;
                        }
                    }
                }
                let frames = state.frames;
                state.writer.finalize()?;
                Ok(frames)
            })?;

        info!(target: "recorder", "recording {} to {}", format, path.display());
        Ok(Self {
            path,
            format,
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> RecordingFormat {
        self.format
    }

    /// Finalize the file and describe it.
    pub fn stop(mut self) -> Result<RecordingArtifact, RecorderError> {
        let frames = self.finish()?;
        debug!(target: "recorder", "finalized {} ({} frames)", self.path.display(), frames);
        Ok(RecordingArtifact {
            path: self.path.clone(),
            format: self.format.name().to_string(),
            frames,
        })
    }

    fn finish(&mut self) -> Result<u64, RecorderError> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        match self.join_handle.take() {
            Some(handle) => handle.join().map_err(|_| RecorderError::WriterPanicked)?,
            None => Err(RecorderError::NotRecording),
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.join_handle.is_some() {
            let _ = self.finish();
        }
    }
}
