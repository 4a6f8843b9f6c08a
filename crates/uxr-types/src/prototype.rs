//! Prototype voice table.
//!
//! Each research prototype in the gallery is bound to a provider kind and,
//! for the request/response provider, a vendor voice and model. Prototypes
//! backed by the hosted conversational agent carry the agent id and the
//! session variables passed to it instead.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Placeholder used until a real hosted agent id is configured.
pub const AGENT_ID_PLACEHOLDER: &str = "REPLACE_WITH_AGENT_ID";

/// Default vendor voice for request/response synthesis.
pub const DEFAULT_VOICE_ID: &str = "pNInz6obpgDQGcFmaJgB";

/// Default vendor synthesis model.
pub const DEFAULT_MODEL_ID: &str = "eleven_monolingual_v1";

/// Which backend a prototype talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoiceProviderKind {
    /// Request/response TTS and STT through the server proxies.
    Elevenlabs,
    /// The vendor's hosted conversational agent, reached by agent id.
    ElevenlabsSdk,
}

/// Voice configuration of one prototype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrototypeVoice {
    pub provider: VoiceProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl PrototypeVoice {
    /// Voice id, falling back to [`DEFAULT_VOICE_ID`].
    pub fn voice_id_or_default(&self) -> &str {
        self.voice_id.as_deref().unwrap_or(DEFAULT_VOICE_ID)
    }

    /// Model id, falling back to [`DEFAULT_MODEL_ID`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL_ID)
    }

    /// Maximum call duration in seconds, when the prototype sets one.
    pub fn max_duration_secs(&self) -> Option<u64> {
        self.settings.get("maxDuration").and_then(Value::as_u64)
    }

    /// Hosted agent id for SDK-backed prototypes.
    pub fn agent_id(&self) -> Option<&str> {
        self.settings.get("agentId").and_then(Value::as_str)
    }
}

/// Lookup of a prototype that has no voice configuration.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no voice configuration found for prototype: {0}")]
pub struct UnknownPrototype(pub String);

/// Names of every configured prototype.
pub const PROTOTYPES: [&str; 5] = [
    "instant-insight",
    "smart-concierge",
    "expert-pulse",
    "sandbox",
    "sandbox-sdk",
];

fn settings(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn tts_voice(voice_id: &str, value: Value) -> PrototypeVoice {
    PrototypeVoice {
        provider: VoiceProviderKind::Elevenlabs,
        voice_id: Some(voice_id.to_string()),
        model: Some(DEFAULT_MODEL_ID.to_string()),
        settings: settings(value),
    }
}

fn hosted_agent(value: Value) -> PrototypeVoice {
    PrototypeVoice {
        provider: VoiceProviderKind::ElevenlabsSdk,
        voice_id: None,
        model: None,
        settings: settings(value),
    }
}

/// Returns the voice configuration for `prototype`.
pub fn voice_config(prototype: &str) -> Result<PrototypeVoice, UnknownPrototype> {
    let config = match prototype {
        "instant-insight" => hosted_agent(json!({
            "agentId": AGENT_ID_PLACEHOLDER,
            "scenario": "You want to learn what types of problems people are facing with voice. \
                The following participants opted in to sharing details after saying they had \
                a bad experience in a post-call survey.",
            "first_message": "Hello! Can you tell me about the issue you faced?",
            "personality": "helpful-researcher",
            "context": "product-feedback",
        })),
        // Friendly, warm voice.
        "smart-concierge" => tts_voice(
            "21m00Tcm4TlvDq8ikWAM",
            json!({
                "personality": "friendly-support",
                "context": "post-purchase",
                "maxDuration": 120,
            }),
        ),
        // Professional, authoritative.
        "expert-pulse" => tts_voice(
            "AZnzlk1XvdvUeBnXmlld",
            json!({
                "personality": "expert-interviewer",
                "context": "market-research",
                "maxDuration": 300,
            }),
        ),
        "sandbox" => tts_voice(
            DEFAULT_VOICE_ID,
            json!({
                "personality": "experimental",
                "context": "testing",
                "maxDuration": 180,
            }),
        ),
        "sandbox-sdk" => hosted_agent(json!({
            "agentId": AGENT_ID_PLACEHOLDER,
            "personality": "experimental-sdk",
            "context": "testing-sdk",
        })),
        other => return Err(UnknownPrototype(other.to_string())),
    };
    Ok(config)
}
