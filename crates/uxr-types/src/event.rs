//! JSON messages exchanged over the relay's text channel.

use serde::{Deserialize, Serialize};

/// A recognition result emitted by the vendor.
///
/// Partials are provisional and may be superseded; finals are authoritative
/// and accumulate into the session transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TranscriptEvent {
    #[serde(rename = "transcript_partial")]
    Partial { text: String },
    #[serde(rename = "transcript_final")]
    Final { text: String },
}

impl TranscriptEvent {
    /// Parses a vendor text message.
    ///
    /// Returns `None` for anything that is not a recognised transcript event:
    /// non-JSON payloads, other `type` values, or a missing `text` field.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Partial { text } | Self::Final { text } => text,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }
}

/// Control messages sent by the capture client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControlMessage {
    /// No more audio will follow.
    Stop,
}

impl ControlMessage {
    /// Serialises the message for a text frame.
    pub fn to_json(self) -> String {
        match self {
            Self::Stop => r#"{"event":"stop"}"#.to_string(),
        }
    }
}
