//! Wire protocol for the generation service.
//!
//! Field names are camelCase on the wire, e.g.
//! `{"serverContent":{"audioChunks":[{"data":"..."}]}}`.

use serde::{Deserialize, Serialize};

pub use promptdj_types::WeightedPrompt;

/// Identifies one logical session. Inbound messages carry the id of the
/// session whose reader produced them so stale traffic can be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// One unit of generated audio, base64 encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioChunk {
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl AudioChunk {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub audio_chunks: Vec<AudioChunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredPrompt {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered_reason: Option<String>,
}

/// Messages sent from the service to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerMessage {
    /// Setup acknowledgement; the session is live.
    SetupComplete {},
    /// A prompt text was rejected by content filtering.
    FilteredPrompt(FilteredPrompt),
    /// Generated audio.
    ServerContent(ServerContent),
    /// Service-side failure. The session is unusable afterwards.
    Error { message: String },
    /// Orderly close initiated by the service.
    Close {},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackControl {
    Play,
    Pause,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlChanges {
    /// Pitch bend in [-1, 1].
    pub pitch_bend: f32,
}

/// Messages sent from the client to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// First frame of every session.
    Setup { model: String },
    #[serde(rename_all = "camelCase")]
    SetWeightedPrompts {
        weighted_prompts: Vec<WeightedPrompt>,
    },
    ControlChanges(ControlChanges),
    PlaybackControl(PlaybackControl),
}

/// Inbound traffic as seen by the engine: a server message, or the end of
/// the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(ServerMessage),
    /// The transport failed or closed without a `close` frame.
    Disconnected(String),
}

/// An inbound item tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub inbound: Inbound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_content_uses_camel_case() {
        let json = r#"{"serverContent":{"audioChunks":[{"data":"AAAA","mimeType":"audio/l16"}]}}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        match msg {
            ServerMessage::ServerContent(content) => {
                assert_eq!(content.audio_chunks.len(), 1);
                assert_eq!(content.audio_chunks[0].data, "AAAA");
                assert_eq!(content.audio_chunks[0].mime_type.as_deref(), Some("audio/l16"));
            }
            other => panic!("expected ServerContent, got {:?}", other),
        }
    }

    #[test]
    fn setup_complete_is_empty_object() {
        let msg: ServerMessage = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
        assert_eq!(msg, ServerMessage::SetupComplete {});
    }

    #[test]
    fn filtered_prompt_reason_is_optional() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"filteredPrompt":{"text":"Thrash"}}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::FilteredPrompt(FilteredPrompt {
                text: "Thrash".to_string(),
                filtered_reason: None,
            })
        );
    }

    #[test]
    fn outbound_prompt_update_shape() {
        let msg = ClientMessage::SetWeightedPrompts {
            weighted_prompts: vec![WeightedPrompt {
                text: "Funk".to_string(),
                weight: 1.0,
            }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"setWeightedPrompts":{"weightedPrompts":[{"text":"Funk","weight":1.0}]}}"#
        );
    }

    #[test]
    fn playback_control_is_screaming_case() {
        let json =
            serde_json::to_string(&ClientMessage::PlaybackControl(PlaybackControl::Pause)).unwrap();
        assert_eq!(json, r#"{"playbackControl":"PAUSE"}"#);
        let json = serde_json::to_string(&ClientMessage::ControlChanges(ControlChanges {
            pitch_bend: -0.5,
        }))
        .unwrap();
        assert_eq!(json, r#"{"controlChanges":{"pitchBend":-0.5}}"#);
    }
}
