use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use promptdj_audio::EngineConfig;
use promptdj_types::EqGains;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    session: SessionConfig,
    #[serde(default)]
    engine: EngineSection,
    #[serde(default)]
    eq: EqConfig,
    #[serde(default)]
    recording: RecordingConfig,
    #[serde(default)]
    midi: MidiConfig,
}

#[derive(Deserialize, Default)]
struct SessionConfig {
    model: Option<String>,
    address: Option<String>,
}

#[derive(Deserialize, Default)]
struct EngineSection {
    buffer_secs: Option<f64>,
    fade_secs: Option<f64>,
    prompt_throttle_ms: Option<u64>,
    pitch_throttle_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct EqConfig {
    low: Option<f32>,
    mid: Option<f32>,
    high: Option<f32>,
    master: Option<f32>,
}

#[derive(Deserialize, Default)]
struct RecordingConfig {
    formats: Option<Vec<String>>,
    directory: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
struct MidiConfig {
    port: Option<String>,
}

pub struct Config {
    session: SessionConfig,
    engine: EngineSection,
    eq: EqConfig,
    recording: RecordingConfig,
    midi: MidiConfig,
}

impl Config {
    /// Embedded defaults, overridden by `<config_dir>/promptdj/config.toml`.
    pub fn load() -> Self {
        Self::load_from(user_config_path().as_deref())
    }

    pub fn load_from(user_path: Option<&Path>) -> Self {
        let mut base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");

        if let Some(path) = user_path {
            if path.exists() {
                match std::fs::read_to_string(path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut base, user),
                        Err(e) => {
                            log::warn!(
                                target: "config",
                                "ignoring malformed config {}: {}",
                                path.display(),
                                e
                            )
                        }
                    },
                    Err(e) => {
                        log::warn!(
                            target: "config",
                            "could not read config {}: {}",
                            path.display(),
                            e
                        )
                    }
                }
            }
        }

        Config {
            session: base.session,
            engine: base.engine,
            eq: base.eq,
            recording: base.recording,
            midi: base.midi,
        }
    }

    pub fn model(&self) -> &str {
        self.session
            .model
            .as_deref()
            .unwrap_or("models/lyria-realtime-exp")
    }

    /// Address of the generation service.
    pub fn address(&self) -> &str {
        self.session.address.as_deref().unwrap_or("127.0.0.1:7070")
    }

    pub fn engine_config(&self) -> EngineConfig {
        let fallback = EngineConfig::default();
        EngineConfig {
            model: self.model().to_string(),
            buffer_secs: self
                .engine
                .buffer_secs
                .filter(|s| s.is_finite() && *s > 0.0)
                .unwrap_or(fallback.buffer_secs),
            fade_secs: self
                .engine
                .fade_secs
                .filter(|s| s.is_finite() && *s >= 0.0)
                .unwrap_or(fallback.fade_secs),
            prompt_cooldown: self
                .engine
                .prompt_throttle_ms
                .map(Duration::from_millis)
                .unwrap_or(fallback.prompt_cooldown),
            pitch_cooldown: self
                .engine
                .pitch_throttle_ms
                .map(Duration::from_millis)
                .unwrap_or(fallback.pitch_cooldown),
            recording_formats: self
                .recording
                .formats
                .clone()
                .unwrap_or(fallback.recording_formats),
            recordings_dir: self.recordings_dir(),
        }
    }

    pub fn eq_gains(&self) -> EqGains {
        EqGains::new(
            self.eq.low.unwrap_or(0.0),
            self.eq.mid.unwrap_or(0.0),
            self.eq.high.unwrap_or(0.0),
        )
        .clamped()
    }

    /// Master volume (clamped to 0..1).
    pub fn master_volume(&self) -> f32 {
        self.eq.master.unwrap_or(1.0).clamp(0.0, 1.0)
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.recording.directory.clone().unwrap_or_else(|| {
            dirs::audio_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(std::env::temp_dir)
                .join("promptdj")
        })
    }

    /// Preferred MIDI input port, matched by substring.
    pub fn midi_port(&self) -> Option<&str> {
        self.midi.port.as_deref()
    }
}

pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("promptdj"))
}

fn user_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    if user.session.model.is_some() {
        base.session.model = user.session.model;
    }
    if user.session.address.is_some() {
        base.session.address = user.session.address;
    }

    if user.engine.buffer_secs.is_some() {
        base.engine.buffer_secs = user.engine.buffer_secs;
    }
    if user.engine.fade_secs.is_some() {
        base.engine.fade_secs = user.engine.fade_secs;
    }
    if user.engine.prompt_throttle_ms.is_some() {
        base.engine.prompt_throttle_ms = user.engine.prompt_throttle_ms;
    }
    if user.engine.pitch_throttle_ms.is_some() {
        base.engine.pitch_throttle_ms = user.engine.pitch_throttle_ms;
    }

    if user.eq.low.is_some() {
        base.eq.low = user.eq.low;
    }
    if user.eq.mid.is_some() {
        base.eq.mid = user.eq.mid;
    }
    if user.eq.high.is_some() {
        base.eq.high = user.eq.high;
    }
    if user.eq.master.is_some() {
        base.eq.master = user.eq.master;
    }

    if user.recording.formats.is_some() {
        base.recording.formats = user.recording.formats;
    }
    if user.recording.directory.is_some() {
        base.recording.directory = user.recording.directory;
    }

    if user.midi.port.is_some() {
        base.midi.port = user.midi.port;
    }
}
