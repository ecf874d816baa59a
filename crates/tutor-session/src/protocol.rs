//! Control-channel wire protocol.
//!
//! One UTF-8 JSON object per data-channel message, tagged by `type`.
//! Outbound events configure the session and mark audio boundaries;
//! inbound events drive the transcript and the speaking indicator.
//! Unknown inbound tags are ignored; malformed payloads are a logged
//! no-op, never a crash.

use crate::config::Config;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Substrings in a transcript delta that trigger the reward animation.
/// Latin entries match case-insensitively.
pub const REWARD_TRIGGERS: &[&str] = &["红包", "angbao", "good"];

/// Session-level instructions payload for `session.update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInstructions {
    /// The tutor system prompt.
    pub instructions: String,
}

/// Response request payload for `response.create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRequest {
    /// Requested output modalities.
    pub modalities: Vec<String>,
    /// Per-response instructions (kept identical to the session
    /// instructions; the model treats the session level as primary).
    pub instructions: String,
    /// Voice to synthesize with.
    pub voice: String,
}

/// Audio marker payload for the outbound `audio.start` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioMarker {
    /// Container/encoding of the upstream audio.
    pub encoding: String,
    /// Samples per second.
    #[serde(rename = "sampleRate")]
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u32,
}

impl Default for AudioMarker {
    fn default() -> Self {
        Self {
            encoding: "webm".to_string(),
            sample_rate: 48_000,
            channels: 1,
        }
    }
}

/// Events sent by the session to the remote model.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Set session instructions; sent once, immediately on channel open.
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration.
        session: SessionInstructions,
    },

    /// Begin the conversation; sent once, immediately after
    /// `session.update`.
    #[serde(rename = "response.create")]
    ResponseCreate {
        /// Response parameters.
        response: ResponseRequest,
    },

    /// User started speaking while the session is active.
    #[serde(rename = "audio.start")]
    AudioStart {
        /// Upstream audio format.
        audio: AudioMarker,
    },

    /// User stop intent.
    #[serde(rename = "audio.end")]
    AudioEnd,
}

impl ClientEvent {
    /// The initial configuration event.
    #[must_use]
    pub fn session_update(config: &Config) -> Self {
        Self::SessionUpdate {
            session: SessionInstructions {
                instructions: config.instructions.clone(),
            },
        }
    }

    /// The conversation-start event.
    #[must_use]
    pub fn response_create(config: &Config) -> Self {
        Self::ResponseCreate {
            response: ResponseRequest {
                modalities: vec!["text".to_string(), "audio".to_string()],
                instructions: config.instructions.clone(),
                voice: config.voice.clone(),
            },
        }
    }

    /// The audio-start marker with the fixed upstream format.
    #[must_use]
    pub fn audio_start() -> Self {
        Self::AudioStart {
            audio: AudioMarker::default(),
        }
    }
}

/// Events received from the remote model.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Transcript fragment.
    #[serde(rename = "text.delta")]
    TextDelta {
        /// Text to append to the transcript.
        delta: String,
    },

    /// The model started speaking.
    #[serde(rename = "audio.start")]
    AudioStart,

    /// The model stopped speaking.
    #[serde(rename = "audio.end")]
    AudioEnd,

    /// Any tag this client does not understand.
    #[serde(other)]
    Unknown,
}

/// Parse an inbound control-channel payload.
///
/// Returns `None` for non-JSON payloads after logging a warning; the
/// caller treats that as a no-op.
#[must_use]
pub fn parse_server_event(payload: &str) -> Option<ServerEvent> {
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(
                target: "tutor.protocol",
                error = %e,
                "Discarding malformed control-channel message"
            );
            None
        }
    }
}

/// Whether a transcript delta should trigger the reward animation.
#[must_use]
pub fn contains_reward_trigger(delta: &str) -> bool {
    let lowered = delta.to_lowercase();
    REWARD_TRIGGERS
        .iter()
        .any(|trigger| lowered.contains(trigger))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let mut config = Config::new("http://localhost/token");
        config.instructions = "Teach greetings.".to_string();
        config.voice = "sage".to_string();
        config
    }

    #[test]
    fn session_update_wire_shape() {
        let event = ClientEvent::session_update(&test_config());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "type": "session.update",
                "session": { "instructions": "Teach greetings." }
            })
        );
    }

    #[test]
    fn response_create_wire_shape() {
        let event = ClientEvent::response_create(&test_config());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "type": "response.create",
                "response": {
                    "modalities": ["text", "audio"],
                    "instructions": "Teach greetings.",
                    "voice": "sage"
                }
            })
        );
    }

    #[test]
    fn audio_start_wire_shape() {
        let json = serde_json::to_value(ClientEvent::audio_start()).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "type": "audio.start",
                "audio": { "encoding": "webm", "sampleRate": 48000, "channels": 1 }
            })
        );
    }

    #[test]
    fn audio_end_has_no_payload() {
        let json = serde_json::to_value(ClientEvent::AudioEnd).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "audio.end" }));
    }

    #[test]
    fn parses_text_delta() {
        let event = parse_server_event(r#"{"type":"text.delta","delta":"你"}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::TextDelta {
                delta: "你".to_string()
            }
        );
    }

    #[test]
    fn parses_audio_markers() {
        assert_eq!(
            parse_server_event(r#"{"type":"audio.start"}"#).unwrap(),
            ServerEvent::AudioStart
        );
        assert_eq!(
            parse_server_event(r#"{"type":"audio.end"}"#).unwrap(),
            ServerEvent::AudioEnd
        );
    }

    #[test]
    fn unknown_tag_is_ignored_without_error() {
        let event = parse_server_event(r#"{"type":"rate_limits.updated","limit":5}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn malformed_payload_is_a_no_op() {
        assert!(parse_server_event("this is not json").is_none());
        assert!(parse_server_event("").is_none());
    }

    #[test]
    fn reward_triggers_match_case_insensitively_for_latin() {
        assert!(contains_reward_trigger("Very GOOD attempt!"));
        assert!(contains_reward_trigger("here is your Angbao"));
        assert!(contains_reward_trigger("恭喜发财，红包拿来"));
        assert!(!contains_reward_trigger("try again"));
    }
}
