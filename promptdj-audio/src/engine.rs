//! PlaybackEngine: playback state machine, gapless scheduling and the
//! control path to the session.
//!
//! The engine is single-threaded. Everything that can take time happens
//! elsewhere (connecting, decoding, rendering) and comes back through
//! channels the engine thread waits on; the engine itself only reacts.
//!
//! Timeline: audio-clock seconds. `next_start_time` is the end of the most
//! recently scheduled buffer, or 0 when nothing is primed.

use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use log::{debug, info, warn};

use promptdj_net::{
    AudioChunk, ConnectionNotice, ConnectionState, Connector, ControlChanges, SessionConnection,
    SessionEvent,
};
use promptdj_types::{EngineEvent, EqGains, PlaybackState, PromptSet};

use crate::clock::{frames_to_secs, secs_to_frames, AudioClock};
use crate::decoder::{ChunkDecoder, DecodeJob, DecodeWorker, Decoded, PcmBuffer};
use crate::graph::{Block, RenderCmd};
use crate::output::RenderLink;
use crate::recorder::{artifact_path, Recorder, RecorderError, RecordingFormat};
use crate::telemetry::ScheduleTelemetry;
use crate::throttle::Throttle;

pub const NO_ACTIVE_PROMPTS: &str = "There needs to be one active prompt to play.";

/// How often the loop checks an in-flight connect.
const CONNECT_POLL: Duration = Duration::from_millis(10);
const SUMMARY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model: String,
    /// Lead between the first buffer's arrival and its playout.
    pub buffer_secs: f64,
    /// Gain fade on play, pause and stop.
    pub fade_secs: f64,
    pub prompt_cooldown: Duration,
    pub pitch_cooldown: Duration,
    /// Preference order, first supported wins.
    pub recording_formats: Vec<String>,
    pub recordings_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "models/lyria-realtime-exp".to_string(),
            buffer_secs: 2.0,
            fade_secs: 0.1,
            prompt_cooldown: Duration::from_millis(200),
            pitch_cooldown: Duration::from_millis(50),
            recording_formats: vec!["wav-f32".to_string(), "wav-i16".to_string()],
            recordings_dir: PathBuf::from("."),
        }
    }
}

pub struct PlaybackEngine {
    config: EngineConfig,
    state: PlaybackState,
    connection: SessionConnection,
    session_rx: Receiver<SessionEvent>,
    /// Finish `play()` once the pending connect resolves.
    play_on_connect: bool,
    prompts: Arc<PromptSet>,
    prompt_throttle: Throttle<Arc<PromptSet>>,
    pitch_throttle: Throttle<f32>,
    next_start_time: f64,
    /// Deferred loading → playing transition, audio-clock seconds.
    playing_at: Option<f64>,
    /// Bumped on pause and stop; decodes from older epochs are dropped.
    epoch: u64,
    decoder: DecodeWorker,
    clock: AudioClock,
    render: RenderLink,
    next_tap_id: u64,
    recording: Option<(u64, Recorder)>,
    telemetry: ScheduleTelemetry,
    last_summary: Instant,
    events: Sender<EngineEvent>,
}

impl PlaybackEngine {
    pub fn new(
        config: EngineConfig,
        connector: Arc<dyn Connector>,
        decoder: Box<dyn ChunkDecoder>,
        render: RenderLink,
        events: Sender<EngineEvent>,
    ) -> std::io::Result<Self> {
        let (session_tx, session_rx) = crossbeam_channel::unbounded();
        let connection = SessionConnection::new(connector, config.model.clone(), session_tx);
        Ok(Self {
            prompt_throttle: Throttle::new(config.prompt_cooldown),
            pitch_throttle: Throttle::new(config.pitch_cooldown),
            state: PlaybackState::Stopped,
            connection,
            session_rx,
            play_on_connect: false,
            prompts: Arc::new(PromptSet::new()),
            next_start_time: 0.0,
            playing_at: None,
            epoch: 0,
            decoder: DecodeWorker::spawn(decoder)?,
            clock: render.clock.clone(),
            render,
            next_tap_id: 1,
            recording: None,
            telemetry: ScheduleTelemetry::new(),
            last_summary: Instant::now(),
            events,
            config,
        })
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn has_session(&self) -> bool {
        self.connection.has_session()
    }

    /// Schedule cursor in audio-clock seconds, 0 when unset.
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Inbound traffic from the current session.
    pub fn session_events(&self) -> &Receiver<SessionEvent> {
        &self.session_rx
    }

    /// Completed decodes, in submission order.
    pub fn decoded(&self) -> &Receiver<Decoded> {
        self.decoder.results()
    }

    // -- notifications ---------------------------------------------------

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    fn emit_error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "engine", "{}", message);
        self.emit(EngineEvent::Error(message));
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state == state {
            return;
        }
        debug!(target: "engine", "{} -> {}", self.state, state);
        self.state = state;
        self.emit(EngineEvent::PlaybackStateChanged(state));
    }

    fn send_render(&self, cmd: RenderCmd) {
        if self.render.tx.send(cmd).is_err() {
            warn!(target: "engine", "render path is gone");
        }
    }

    fn fade(&self, from: Option<f32>, to: f32) {
        let now = self.clock.frames();
        self.send_render(RenderCmd::Fade {
            from,
            to,
            start_frame: now,
            end_frame: now + secs_to_frames(self.config.fade_secs),
        });
    }

    /// Forget the timeline: cursor, deferred transition and in-flight decodes.
    fn reset_timeline(&mut self) {
        self.next_start_time = 0.0;
        self.playing_at = None;
        self.epoch += 1;
    }

    // -- transport ------------------------------------------------------

    pub fn play(&mut self) {
        if matches!(self.state, PlaybackState::Playing | PlaybackState::Loading) {
            debug!(target: "engine", "play ignored while {}", self.state);
            return;
        }
        self.set_state(PlaybackState::Loading);

        if self.connection.has_session() {
            self.start_stream();
        } else {
            self.play_on_connect = true;
            if let Some(pending) = self.connection.connect() {
                info!(target: "engine", "connecting {}", pending.session_id());
            }
        }
    }

    /// Second half of `play()`, once a session exists.
    fn start_stream(&mut self) {
        self.prompt_throttle.cancel();
        let prompts = Arc::clone(&self.prompts);
        if !self.push_prompts(&prompts) {
            return;
        }

        self.send_render(RenderCmd::Resume);
        if let Some(session) = self.connection.session_mut() {
            if let Err(e) = session.play() {
                self.emit_error(format!("Failed to start playback: {}", e));
                self.pause();
                return;
            }
        }
        self.fade(Some(0.0), 1.0);
    }

    pub fn pause(&mut self) {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Loading) {
            return;
        }
        if let Some(session) = self.connection.session_mut() {
            if let Err(e) = session.pause() {
                warn!(target: "engine", "remote pause failed: {}", e);
            }
        }
        self.play_on_connect = false;
        self.set_state(PlaybackState::Paused);
        self.fade(Some(1.0), 0.0);
        self.reset_timeline();
        self.send_render(RenderCmd::ReplaceGainStage);
    }

    pub fn stop(&mut self) {
        if let Some(session) = self.connection.session_mut() {
            if let Err(e) = session.stop() {
                warn!(target: "engine", "remote stop failed: {}", e);
            }
        }
        if self.state == PlaybackState::Stopped && !self.connection.is_connecting() {
            return;
        }

        self.play_on_connect = false;
        self.set_state(PlaybackState::Stopped);
        self.fade(None, 0.0);
        self.reset_timeline();
        self.send_render(RenderCmd::ReplaceGainStage);
        self.prompt_throttle.cancel();
        self.pitch_throttle.cancel();
        self.connection.disconnect();
    }

    pub fn play_pause(&mut self) {
        match self.state {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused | PlaybackState::Stopped => self.play(),
            PlaybackState::Loading => self.stop(),
        }
    }

    // -- control path ---------------------------------------------------

    /// Take a new prompt snapshot; the push happens once the cooldown allows.
    pub fn set_weighted_prompts(&mut self, prompts: Arc<PromptSet>, now: Instant) {
        self.prompts = Arc::clone(&prompts);
        self.prompt_throttle.call(prompts, now);
    }

    pub fn set_pitch_bend(&mut self, value: f32, now: Instant) {
        let value = if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) };
        self.pitch_throttle.call(value, now);
    }

    /// Push the active subset of `prompts`. Returns false when playback was
    /// paused instead.
    fn push_prompts(&mut self, prompts: &PromptSet) -> bool {
        let active = prompts.active_prompts(self.connection.filtered());
        if active.is_empty() {
            self.emit_error(NO_ACTIVE_PROMPTS);
            self.pause();
            return false;
        }

        let Some(session) = self.connection.session_mut() else {
            return true;
        };
        match session.set_weighted_prompts(&active) {
            Ok(()) => {
                debug!(target: "engine", "pushed {} active prompt(s)", active.len());
                true
            }
            Err(e) => {
                self.emit_error(format!("Failed to set prompts: {}", e));
                self.pause();
                false
            }
        }
    }

    fn push_pitch_bend(&mut self, value: f32) {
        if !self.state.accepts_audio() {
            return;
        }
        let Some(session) = self.connection.session_mut() else {
            return;
        };
        if let Err(e) = session.send_control_changes(ControlChanges { pitch_bend: value }) {
            self.emit_error(format!("Failed to set pitch bend: {}", e));
            self.pause();
        }
    }

    pub fn set_eq_gains(&mut self, gains: EqGains) {
        self.send_render(RenderCmd::SetEq(gains.clamped()));
    }

    pub fn set_master_volume(&mut self, level: f32) {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
        self.send_render(RenderCmd::SetMaster(level));
    }

    pub fn attach_output(&mut self, tx: crossbeam_channel::Sender<Block>) -> u64 {
        let id = self.next_tap_id;
        self.next_tap_id += 1;
        self.send_render(RenderCmd::AttachTap { id, tx });
        id
    }

    // -- inbound --------------------------------------------------------

    pub fn handle_session_event(&mut self, event: SessionEvent) {
        match self.connection.handle_event(event) {
            None => {}
            Some(ConnectionNotice::Connected) => {
                info!(target: "engine", "session setup complete");
            }
            Some(ConnectionNotice::FilteredPrompt(text)) => {
                self.emit(EngineEvent::FilteredPrompt(text));
            }
            Some(ConnectionNotice::AudioChunks(chunks)) => self.process_audio_chunks(chunks),
            Some(ConnectionNotice::Lost(reason)) => {
                self.stop();
                self.emit_error(format!("Connection error, please restart audio. ({})", reason));
            }
        }
    }

    /// Hand the first chunk of a batch to the decoder. Batches arriving
    /// while paused or stopped are discarded.
    pub fn process_audio_chunks(&mut self, chunks: Vec<AudioChunk>) {
        if !self.state.accepts_audio() {
            return;
        }
        let extra = chunks.len().saturating_sub(1);
        let Some(chunk) = chunks.into_iter().next() else {
            return;
        };
        if extra > 0 {
            debug!(target: "engine", "batch carried {} extra chunk(s), using the first", extra);
        }
        let job = DecodeJob {
            epoch: self.epoch,
            chunk,
        };
        if let Err(e) = self.decoder.submit(job) {
            self.emit_error(e);
        }
    }

    pub fn on_decoded(&mut self, decoded: Decoded) {
        if decoded.epoch != self.epoch || !self.state.accepts_audio() {
            debug!(target: "engine", "dropping stale decode");
            return;
        }
        match decoded.result {
            Ok(buffer) => {
                self.schedule_buffer(buffer);
            }
            Err(e) => warn!(target: "engine", "skipping chunk: {}", e),
        }
    }

    /// Place `buffer` on the timeline. Returns its start time, or `None`
    /// when it arrived too late and the timeline was reset.
    pub fn schedule_buffer(&mut self, buffer: PcmBuffer) -> Option<f64> {
        let now = self.clock.now();

        if self.next_start_time == 0.0 {
            self.next_start_time = now + self.config.buffer_secs;
            self.playing_at = Some(now + self.config.buffer_secs);
        }

        if self.next_start_time < now {
            debug!(
                target: "engine",
                "underrun: cursor {:.3}s behind clock {:.3}s",
                self.next_start_time,
                now
            );
            self.set_state(PlaybackState::Loading);
            self.next_start_time = 0.0;
            self.playing_at = None;
            self.telemetry.record_underrun();
            return None;
        }

        let start = self.next_start_time;
        self.next_start_time += buffer.duration_secs();
        self.telemetry
            .record_lead(Duration::from_secs_f64((start - now).max(0.0)));
        self.send_render(RenderCmd::Schedule {
            start_frame: secs_to_frames(start),
            buffer,
        });
        Some(start)
    }

    // -- timers ---------------------------------------------------------

    /// Run everything that is due at `now`.
    pub fn poll(&mut self, now: Instant) {
        if let Some(result) = self.connection.poll_connect() {
            match result {
                Ok(()) if self.play_on_connect => {
                    self.play_on_connect = false;
                    self.start_stream();
                }
                Ok(()) => {}
                Err(e) => {
                    self.stop();
                    self.emit_error(format!("Could not connect: {}", e));
                }
            }
        }

        if let Some(prompts) = self.prompt_throttle.poll(now) {
            self.push_prompts(&prompts);
        }
        if let Some(value) = self.pitch_throttle.poll(now) {
            self.push_pitch_bend(value);
        }

        if let Some(at) = self.playing_at {
            if self.clock.now() >= at {
                self.playing_at = None;
                if self.state == PlaybackState::Loading {
                    self.set_state(PlaybackState::Playing);
                }
            }
        }

        if now.duration_since(self.last_summary) >= SUMMARY_INTERVAL {
            self.last_summary = now;
            if self.telemetry.has_samples() {
                let s = self.telemetry.take_summary();
                debug!(
                    target: "engine",
                    "lead avg {}ms min {}ms, {} underrun(s)",
                    s.avg_lead_ms,
                    s.min_lead_ms,
                    s.underruns
                );
                self.emit(EngineEvent::ScheduleSummary {
                    avg_lead_ms: s.avg_lead_ms,
                    min_lead_ms: s.min_lead_ms,
                    underruns: s.underruns,
                });
            }
        }
    }

    /// Earliest instant `poll` has something to do.
    pub fn next_deadline(&self, now: Instant) -> Instant {
        let mut deadline = self.last_summary + SUMMARY_INTERVAL;
        for d in [
            self.prompt_throttle.next_deadline(),
            self.pitch_throttle.next_deadline(),
        ]
        .into_iter()
        .flatten()
        {
            deadline = deadline.min(d);
        }
        if self.connection.is_connecting() {
            deadline = deadline.min(now + CONNECT_POLL);
        }
        if let Some(at) = self.playing_at {
            let wait = (at - self.clock.now()).max(0.0);
            deadline = deadline.min(now + Duration::from_secs_f64(wait));
        }
        deadline
    }

    // -- recording ------------------------------------------------------

    pub fn start_recording(&mut self) {
        if let Err(e) = self.try_start_recording() {
            self.emit_error(format!("Could not start recording: {}", e));
        }
    }

    fn try_start_recording(&mut self) -> Result<(), RecorderError> {
        if self.recording.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        let format = RecordingFormat::negotiate(&self.config.recording_formats)?;
        let (tx, rx) = crossbeam_channel::unbounded();
        let recorder = Recorder::start(artifact_path(&self.config.recordings_dir), format, rx)?;
        let tap = self.attach_output(tx);
        self.recording = Some((tap, recorder));
        self.emit(EngineEvent::RecordingStarted {
            format: format.name().to_string(),
        });
        Ok(())
    }

    pub fn stop_recording(&mut self) {
        let Some((tap, recorder)) = self.recording.take() else {
            debug!(target: "engine", "stop recording ignored, not recording");
            return;
        };
        self.send_render(RenderCmd::DetachTap { id: tap });
        match recorder.stop() {
            Ok(artifact) => {
                info!(
                    target: "engine",
                    "recorded {:.1}s to {}",
                    frames_to_secs(artifact.frames),
                    artifact.path.display()
                );
                self.emit(EngineEvent::RecordingFinished(artifact));
            }
            Err(e) => self.emit_error(format!("Recording failed: {}", e)),
        }
    }

    /// Stop everything before the engine thread exits.
    pub fn shutdown(&mut self) {
        self.stop_recording();
        self.stop();
        if self.connection.has_session() {
            self.connection.disconnect();
        }
    }
}
