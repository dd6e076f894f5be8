use serde::{Deserialize, Serialize};

/// Limit for each EQ band gain, in dB.
pub const EQ_GAIN_LIMIT_DB: f32 = 24.0;

/// Playback state owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Loading,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Loading => "loading",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        }
    }

    /// Whether inbound audio is accepted in this state.
    pub fn accepts_audio(&self) -> bool {
        matches!(self, PlaybackState::Loading | PlaybackState::Playing)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Three-band EQ gains in dB.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EqGains {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl EqGains {
    pub fn new(low: f32, mid: f32, high: f32) -> Self {
        Self { low, mid, high }.clamped()
    }

    pub fn clamped(self) -> Self {
        let clamp = |g: f32| {
            if g.is_nan() {
                0.0
            } else {
                g.clamp(-EQ_GAIN_LIMIT_DB, EQ_GAIN_LIMIT_DB)
            }
        };
        Self {
            low: clamp(self.low),
            mid: clamp(self.mid),
            high: clamp(self.high),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_loading_and_playing_accept_audio() {
        assert!(PlaybackState::Loading.accepts_audio());
        assert!(PlaybackState::Playing.accepts_audio());
        assert!(!PlaybackState::Paused.accepts_audio());
        assert!(!PlaybackState::Stopped.accepts_audio());
    }

    #[test]
    fn state_serializes_lowercase() {
        let json = serde_json::to_string(&PlaybackState::Loading).unwrap();
        assert_eq!(json, "\"loading\"");
    }

    #[test]
    fn eq_gains_clamp() {
        let gains = EqGains::new(-40.0, f32::NAN, 30.0);
        assert_eq!(gains.low, -EQ_GAIN_LIMIT_DB);
        assert_eq!(gains.mid, 0.0);
        assert_eq!(gains.high, EQ_GAIN_LIMIT_DB);
    }
}
