//! Chunk decoding: base64 payloads to interleaved f32 PCM.
//!
//! The service sends raw 16-bit little-endian stereo PCM at 48 kHz. Decoding
//! happens on a dedicated worker so the engine loop keeps receiving while a
//! chunk is being converted; jobs complete in submission order.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossbeam_channel::{Receiver, Sender};

use promptdj_net::AudioChunk;
use promptdj_types::{CHANNELS, SAMPLE_RATE};

/// Decoded audio ready to be scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// Interleaved stereo samples.
    samples: Arc<[f32]>,
}

impl PcmBuffer {
    pub fn from_interleaved(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    /// Silence lasting `secs`, handy for tests and priming.
    pub fn silence(secs: f64) -> Self {
        let frames = (secs * SAMPLE_RATE as f64).round() as usize;
        Self::from_interleaved(vec![0.0; frames * CHANNELS as usize])
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / CHANNELS as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / SAMPLE_RATE as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Base64(String),
    Empty,
    /// Payload length is not a whole number of stereo 16-bit frames.
    Misaligned(usize),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base64(e) => write!(f, "invalid base64 audio: {}", e),
            Self::Empty => write!(f, "empty audio chunk"),
            Self::Misaligned(len) => {
                write!(f, "audio payload of {} bytes is not frame aligned", len)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<base64::DecodeError> for DecodeError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Base64(e.to_string())
    }
}

/// Bytes-to-samples conversion for one chunk.
pub trait ChunkDecoder: Send {
    fn decode(&self, chunk: &AudioChunk) -> Result<PcmBuffer, DecodeError>;
}

/// 16-bit little-endian interleaved stereo.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pcm16Decoder;

impl ChunkDecoder for Pcm16Decoder {
    fn decode(&self, chunk: &AudioChunk) -> Result<PcmBuffer, DecodeError> {
        let bytes = BASE64.decode(chunk.data.as_bytes())?;
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let frame_bytes = 2 * CHANNELS as usize;
        if bytes.len() % frame_bytes != 0 {
            return Err(DecodeError::Misaligned(bytes.len()));
        }

        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect();
        Ok(PcmBuffer::from_interleaved(samples))
    }
}

/// Encode interleaved f32 samples the way the service sends them.
pub fn encode_pcm16(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    BASE64.encode(bytes)
}

pub struct DecodeJob {
    pub epoch: u64,
    pub chunk: AudioChunk,
}

pub struct Decoded {
    pub epoch: u64,
    pub result: Result<PcmBuffer, DecodeError>,
}

/// FIFO decode thread.
pub struct DecodeWorker {
    job_tx: Option<Sender<DecodeJob>>,
    result_rx: Receiver<Decoded>,
    join_handle: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    pub fn spawn(decoder: Box<dyn ChunkDecoder>) -> std::io::Result<Self> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<DecodeJob>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();

        let join_handle = thread::Builder::new()
            .name("promptdj-decode".to_string())
            .spawn(move || {
                for job in job_rx {
                    let result = decoder.decode(&job.chunk);
                    if result_tx
                        .send(Decoded {
                            epoch: job.epoch,
                            result,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
            })?;

        Ok(Self {
            job_tx: Some(job_tx),
            result_rx,
            join_handle: Some(join_handle),
        })
    }

    pub fn submit(&self, job: DecodeJob) -> Result<(), String> {
        match &self.job_tx {
            Some(tx) => tx.send(job).map_err(|_| "decode worker stopped".to_string()),
            None => Err("decode worker stopped".to_string()),
        }
    }

    pub fn results(&self) -> &Receiver<Decoded> {
        &self.result_rx
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.job_tx = None;
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}
