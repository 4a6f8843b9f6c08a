use serde::{Deserialize, Serialize};
use std::time::Duration;
use uxr_types::{FRAME_SAMPLES, SAMPLE_RATE_HZ};

fn default_relay_url() -> String {
    "ws://127.0.0.1:3000/api/voice/elevenlabs/stream".to_string()
}

fn default_proxy_base_url() -> String {
    "http://127.0.0.1:3000/api/voice/elevenlabs".to_string()
}

fn default_sample_rate() -> u32 {
    SAMPLE_RATE_HZ
}

fn default_frame_samples() -> usize {
    FRAME_SAMPLES
}

fn default_stop_grace_ms() -> u64 {
    1000
}

/// Settings of the streaming capture pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// WebSocket URL of the relay proxy.
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Samples per binary frame.
    #[serde(default = "default_frame_samples")]
    pub frame_samples: usize,
    /// How long `stop` waits for in-flight final transcripts. Default: 1000 ms.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            sample_rate: default_sample_rate(),
            frame_samples: default_frame_samples(),
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

impl CaptureConfig {
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            ..Self::default()
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Settings of the request/response voice provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Base URL of the server's vendor proxy routes (`/tts`, `/stt` below it).
    #[serde(default = "default_proxy_base_url")]
    pub proxy_base_url: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            proxy_base_url: default_proxy_base_url(),
            sample_rate: default_sample_rate(),
        }
    }
}
