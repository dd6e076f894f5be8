use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};

use promptdj_net::SessionEvent;

use super::commands::EngineCmd;
use super::decoder::Decoded;
use super::engine::PlaybackEngine;

pub(crate) struct EngineThread {
    engine: PlaybackEngine,
    /// Transport and pitch bend
    priority_rx: Receiver<EngineCmd>,
    /// Prompts, EQ, volume, recording
    normal_rx: Receiver<EngineCmd>,
    session_rx: Receiver<SessionEvent>,
    decoded_rx: Receiver<Decoded>,
}

impl EngineThread {
    pub(crate) fn new(
        engine: PlaybackEngine,
        priority_rx: Receiver<EngineCmd>,
        normal_rx: Receiver<EngineCmd>,
    ) -> Self {
        let session_rx = engine.session_events().clone();
        let decoded_rx = engine.decoded().clone();
        Self {
            engine,
            priority_rx,
            normal_rx,
            session_rx,
            decoded_rx,
        }
    }

    pub(crate) fn run(mut self) {
        loop {
            let now = Instant::now();
            let timeout = self.engine.next_deadline(now).saturating_duration_since(now);

            crossbeam_channel::select! {
                recv(self.priority_rx) -> result => {
                    match result {
                        Ok(cmd) => {
                            if self.handle_cmd(cmd) {
                                break;
                            }
                        }
                        Err(_) => break, // Disconnected
                    }
                }
                recv(self.normal_rx) -> result => {
                    match result {
                        Ok(cmd) => {
                            if self.handle_cmd(cmd) {
                                break;
                            }
                        }
                        Err(_) => break, // Disconnected
                    }
                }
                // Inbound messages are handled one at a time, in arrival order
                recv(self.session_rx) -> result => {
                    if let Ok(event) = result {
                        self.engine.handle_session_event(event);
                    }
                }
                recv(self.decoded_rx) -> result => {
                    if let Ok(decoded) = result {
                        self.engine.on_decoded(decoded);
                    }
                }
                default(timeout) => {}
            }

            if self.drain_priority_commands() {
                break;
            }
            self.engine.poll(Instant::now());
        }

        log::debug!(target: "engine", "engine thread exiting");
        self.engine.shutdown();
    }

    /// Drain pending priority commands, bounded so inbound audio keeps
    /// flowing under a burst of controller input.
    fn drain_priority_commands(&mut self) -> bool {
        const MAX_DURATION: Duration = Duration::from_micros(500);
        const MAX_COUNT: usize = 64;

        let start = Instant::now();
        for _ in 0..MAX_COUNT {
            if start.elapsed() >= MAX_DURATION {
                break;
            }
            match self.priority_rx.try_recv() {
                Ok(cmd) => {
                    if self.handle_cmd(cmd) {
                        return true;
                    }
                }
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
        false
    }

    /// Returns true when the thread should exit.
    fn handle_cmd(&mut self, cmd: EngineCmd) -> bool {
        let now = Instant::now();
        match cmd {
            EngineCmd::Play => self.engine.play(),
            EngineCmd::Pause => self.engine.pause(),
            EngineCmd::Stop => self.engine.stop(),
            EngineCmd::PlayPause => self.engine.play_pause(),
            EngineCmd::SetWeightedPrompts(prompts) => {
                self.engine.set_weighted_prompts(prompts, now)
            }
            EngineCmd::SetPitchBend(value) => self.engine.set_pitch_bend(value, now),
            EngineCmd::SetEqGains(gains) => self.engine.set_eq_gains(gains),
            EngineCmd::SetMasterVolume(level) => self.engine.set_master_volume(level),
            EngineCmd::StartRecording => self.engine.start_recording(),
            EngineCmd::StopRecording => self.engine.stop_recording(),
            EngineCmd::AttachOutput(tx) => {
                self.engine.attach_output(tx);
            }
            EngineCmd::Shutdown => return true,
        }
        false
    }
}
