//! EngineHandle: main-thread interface to the playback engine.
//!
//! Owns the command/feedback channels and the shared meter. The
//! PlaybackEngine itself lives on the engine thread.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender as CrossbeamSender;

use promptdj_net::Connector;
use promptdj_types::{EngineEvent, EqGains, PlaybackState, PromptSet, RecordingArtifact};

use super::commands::EngineCmd;
use super::decoder::Pcm16Decoder;
use super::engine::{EngineConfig, PlaybackEngine};
use super::graph::{Block, OutputMeter};
use super::output::RenderLink;

/// Engine-owned read state, kept current from the feedback channel.
#[derive(Debug, Clone, Default)]
pub struct EngineReadState {
    pub playback: PlaybackState,
    pub recording: bool,
    pub last_recording: Option<RecordingArtifact>,
    pub last_error: Option<String>,
    pub filtered: Vec<String>,
}

impl EngineReadState {
    fn apply(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::PlaybackStateChanged(state) => {
                // Leaving Stopped means a fresh session with an empty filtered set.
                if self.playback == PlaybackState::Stopped && *state == PlaybackState::Loading {
                    self.filtered.clear();
                }
                self.playback = *state;
            }
            EngineEvent::FilteredPrompt(text) => {
                if !self.filtered.contains(text) {
                    self.filtered.push(text.clone());
                }
            }
            EngineEvent::Error(message) => self.last_error = Some(message.clone()),
            EngineEvent::RecordingStarted { .. } => self.recording = true,
            EngineEvent::RecordingFinished(artifact) => {
                self.recording = false;
                self.last_recording = Some(artifact.clone());
            }
            EngineEvent::ScheduleSummary { .. } => {}
        }
    }
}

/// Main-thread handle to the engine thread.
pub struct EngineHandle {
    priority_tx: CrossbeamSender<EngineCmd>,
    normal_tx: CrossbeamSender<EngineCmd>,
    feedback_rx: Receiver<EngineEvent>,
    meter: OutputMeter,
    read_state: EngineReadState,
    join_handle: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn spawn(
        config: EngineConfig,
        connector: Arc<dyn Connector>,
        render: RenderLink,
    ) -> std::io::Result<Self> {
        let (priority_tx, priority_rx) = crossbeam_channel::unbounded();
        let (normal_tx, normal_rx) = crossbeam_channel::unbounded();
        let (feedback_tx, feedback_rx) = mpsc::channel();
        let meter = render.meter.clone();

        let engine = PlaybackEngine::new(
            config,
            connector,
            Box::new(Pcm16Decoder),
            render,
            feedback_tx,
        )?;
        let join_handle = thread::Builder::new()
            .name("promptdj-engine".to_string())
            .spawn(move || {
                super::engine_thread::EngineThread::new(engine, priority_rx, normal_rx).run();
            })?;

        Ok(Self {
            priority_tx,
            normal_tx,
            feedback_rx,
            meter,
            read_state: EngineReadState::default(),
            join_handle: Some(join_handle),
        })
    }

    /// Send a command to the engine thread, routing to priority or normal channel.
    pub fn send_cmd(&self, cmd: EngineCmd) -> Result<(), String> {
        let tx = if cmd.is_priority() {
            &self.priority_tx
        } else {
            &self.normal_tx
        };
        tx.send(cmd)
            .map_err(|_| "Engine thread disconnected".to_string())
    }

    /// Fire-and-forget: send a command and log if the engine thread is gone.
    fn send(&self, cmd: EngineCmd) {
        if let Err(e) = self.send_cmd(cmd) {
            log::warn!(target: "engine", "command dropped: {}", e);
        }
    }

    pub fn play(&self) {
        self.send(EngineCmd::Play);
    }

    pub fn pause(&self) {
        self.send(EngineCmd::Pause);
    }

    pub fn stop(&self) {
        self.send(EngineCmd::Stop);
    }

    pub fn play_pause(&self) {
        self.send(EngineCmd::PlayPause);
    }

    pub fn set_weighted_prompts(&self, prompts: Arc<PromptSet>) {
        self.send(EngineCmd::SetWeightedPrompts(prompts));
    }

    pub fn set_pitch_bend(&self, value: f32) {
        self.send(EngineCmd::SetPitchBend(value));
    }

    pub fn set_eq_gains(&self, gains: EqGains) {
        self.send(EngineCmd::SetEqGains(gains));
    }

    pub fn set_master_volume(&self, level: f32) {
        self.send(EngineCmd::SetMasterVolume(level));
    }

    pub fn start_recording(&self) {
        self.send(EngineCmd::StartRecording);
    }

    pub fn stop_recording(&self) {
        self.send(EngineCmd::StopRecording);
    }

    /// A receiver of every rendered master block, for an extra destination.
    pub fn attach_output(&self) -> crossbeam_channel::Receiver<Block> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.send(EngineCmd::AttachOutput(tx));
        rx
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.feedback_rx.try_recv() {
            self.read_state.apply(&event);
            out.push(event);
        }
        out
    }

    pub fn read_state(&self) -> &EngineReadState {
        &self.read_state
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.read_state.playback
    }

    /// Peak of the last rendered block.
    pub fn output_peak(&self) -> f32 {
        self.meter.peak()
    }

    /// Stop the engine thread and wait for it.
    pub fn shutdown(&mut self) {
        let _ = self.priority_tx.send(EngineCmd::Shutdown);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{render_link, NullOutput};
    use promptdj_net::{Session, SessionEvent, SessionId, TcpConnector};
    use std::time::{Duration, Instant};

    fn wait_for(handle: &mut EngineHandle, pred: impl Fn(&EngineEvent) -> bool) -> EngineEvent {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if let Some(found) = handle.drain_events().into_iter().find(|e| pred(e)) {
                return found;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("event never arrived");
    }

    #[test]
    fn unreachable_service_surfaces_error_and_stops() {
        // Nothing listens on port 9 of the loopback interface.
        let connector =
            Arc::new(TcpConnector::new("127.0.0.1:9").with_timeout(Duration::from_millis(200)));
        let (link, renderer) = render_link();
        let _output = NullOutput::spawn(renderer).unwrap();
        let mut handle = EngineHandle::spawn(EngineConfig::default(), connector, link).unwrap();

        handle.play();
        let err = wait_for(&mut handle, |e| matches!(e, EngineEvent::Error(_)));
        assert!(matches!(err, EngineEvent::Error(m) if m.starts_with("Could not connect")));
        assert_eq!(handle.playback_state(), PlaybackState::Stopped);
    }

    #[test]
    fn extra_output_receives_blocks() {
        struct Never;
        impl Connector for Never {
            fn connect(
                &self,
                _: SessionId,
                _: &str,
                _: CrossbeamSender<SessionEvent>,
            ) -> std::io::Result<Box<dyn Session>> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "offline"))
            }
        }

        let (link, renderer) = render_link();
        let resume = link.tx.clone();
        let _output = NullOutput::spawn(renderer).unwrap();
        let handle = EngineHandle::spawn(EngineConfig::default(), Arc::new(Never), link).unwrap();

        let blocks = handle.attach_output();
        resume.send(crate::graph::RenderCmd::Resume).unwrap();
        let block = blocks.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(!block.is_empty());
    }

    #[test]
    fn filtered_texts_reset_when_a_new_session_starts() {
        let mut state = EngineReadState::default();
        state.apply(&EngineEvent::PlaybackStateChanged(PlaybackState::Loading));
        state.apply(&EngineEvent::FilteredPrompt("Thrash".to_string()));
        state.apply(&EngineEvent::FilteredPrompt("Thrash".to_string()));
        assert_eq!(state.filtered, vec!["Thrash".to_string()]);

        // Pause and resume keep the session.
        state.apply(&EngineEvent::PlaybackStateChanged(PlaybackState::Paused));
        state.apply(&EngineEvent::PlaybackStateChanged(PlaybackState::Loading));
        assert_eq!(state.filtered.len(), 1);

        state.apply(&EngineEvent::PlaybackStateChanged(PlaybackState::Stopped));
        assert_eq!(state.filtered.len(), 1);
        state.apply(&EngineEvent::PlaybackStateChanged(PlaybackState::Loading));
        assert!(state.filtered.is_empty());
        assert_eq!(state.playback, PlaybackState::Loading);
    }
}
