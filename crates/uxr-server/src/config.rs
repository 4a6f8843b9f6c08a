//! Server configuration loading from file and environment variables.

use axum::http::HeaderValue;
use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;
use uxr_types::prototype::{DEFAULT_MODEL_ID, DEFAULT_VOICE_ID};

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Speech vendor endpoints.
    #[serde(default)]
    pub vendor: VendorConfig,

    /// Chat completion endpoint used by `/api/summarise`.
    #[serde(default)]
    pub summarise: SummariseConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "uxr_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VendorConfig {
    /// Streaming speech-to-text WebSocket endpoint.
    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    /// Base of the vendor REST API (`/text-to-speech`, `/speech-to-text`).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Upper bound on opening the upstream socket. Default: 10000 ms.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_voice_id")]
    pub default_voice_id: String,

    #[serde(default = "default_model_id")]
    pub default_model_id: String,
}

impl VendorConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummariseConfig {
    #[serde(default = "default_completions_url")]
    pub completions_url: String,

    #[serde(default = "default_summarise_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stream_url() -> String {
    "wss://api.elevenlabs.io/v1/speech-to-text/stream".to_string()
}

fn default_api_base_url() -> String {
    "https://api.elevenlabs.io/v1".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_voice_id() -> String {
    DEFAULT_VOICE_ID.to_string()
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

fn default_completions_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_summarise_model() -> String {
    "gpt-3.5-turbo-0125".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            stream_url: default_stream_url(),
            api_base_url: default_api_base_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            default_voice_id: default_voice_id(),
            default_model_id: default_model_id(),
        }
    }
}

impl Default for SummariseConfig {
    fn default() -> Self {
        Self {
            completions_url: default_completions_url(),
            model: default_summarise_model(),
            temperature: default_temperature(),
        }
    }
}

/// A secret credential. Never printed, and marked sensitive whenever it is
/// attached to a request.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(HeaderValue);

impl ApiKey {
    /// Wraps `value`. Blank strings and values that cannot travel in a
    /// header count as no key.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        let mut header = HeaderValue::from_str(trimmed).ok()?;
        header.set_sensitive(true);
        Some(Self(header))
    }

    pub fn expose(&self) -> &str {
        self.0.to_str().unwrap_or_default()
    }

    pub fn header_value(&self) -> HeaderValue {
        self.0.clone()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Upstream credentials, read from the process environment only.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// `ELEVENLABS_API_KEY`
    pub vendor: Option<ApiKey>,
    /// `OPENAI_API_KEY`
    pub completions: Option<ApiKey>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            vendor: lookup("ELEVENLABS_API_KEY").and_then(ApiKey::new),
            completions: lookup("OPENAI_API_KEY").and_then(ApiKey::new),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `UXR_HOST` overrides `server.host`
/// - `UXR_PORT` overrides `server.port`
/// - `UXR_LOG_LEVEL` overrides `logging.level`
/// - `UXR_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `UXR_VENDOR_STREAM_URL` overrides `vendor.stream_url`
/// - `UXR_VENDOR_API_BASE_URL` overrides `vendor.api_base_url`
/// - `UXR_COMPLETIONS_URL` overrides `summarise.completions_url`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    Ok(apply_overrides(config, |name| std::env::var(name).ok()))
}

fn apply_overrides(mut config: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(host) = var("UXR_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("UXR_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = var("UXR_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("UXR_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(url) = var("UXR_VENDOR_STREAM_URL") {
        config.vendor.stream_url = url;
    }
    if let Some(url) = var("UXR_VENDOR_API_BASE_URL") {
        config.vendor.api_base_url = url;
    }
    if let Some(url) = var("UXR_COMPLETIONS_URL") {
        config.summarise.completions_url = url;
    }
    config
}
