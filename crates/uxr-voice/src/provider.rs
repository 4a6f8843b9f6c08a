//! Voice provider backends.
//!
//! A [`VoiceProvider`] records the user, turns text into speech and speech
//! into text. The implementation is chosen from the prototype's provider
//! kind when it is built; callers only see the trait object.

use crate::config::ProviderSettings;
use crate::error::VoiceError;
use crate::source::AudioSource;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uxr_types::{encode_sample, PrototypeVoice, VoiceProviderKind};

/// Vendor file-transcription model.
const STT_MODEL_ID: &str = "scribe_v1";

/// A finished recording, mono PCM16.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Recording {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Encodes the recording as a 16-bit mono WAV file.
    pub fn to_wav(&self) -> Result<Vec<u8>, VoiceError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for &sample in &self.samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }
}

/// Synthesised speech returned by a provider.
#[derive(Debug, Clone)]
pub struct SpeechAudio {
    pub content_type: String,
    pub data: Bytes,
}

#[async_trait]
pub trait VoiceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn initialize(&mut self, config: PrototypeVoice) -> Result<(), VoiceError>;

    async fn start_recording(&mut self, source: Box<dyn AudioSource>) -> Result<(), VoiceError>;

    async fn stop_recording(&mut self) -> Result<Recording, VoiceError>;

    async fn synthesize_speech(&self, text: &str) -> Result<SpeechAudio, VoiceError>;

    async fn transcribe(&self, recording: &Recording) -> Result<String, VoiceError>;

    /// Produces the agent's reply to a user message.
    async fn process_message(&self, message: &str) -> Result<String, VoiceError>;

    /// Releases the input device and drops any partial recording.
    fn cleanup(&mut self);
}

/// Builds the provider for a prototype's voice configuration.
///
/// The hosted conversational agent is reached through the vendor's own
/// client and has no provider here.
pub fn build_provider(
    kind: VoiceProviderKind,
    settings: ProviderSettings,
) -> Result<Box<dyn VoiceProvider>, VoiceError> {
    match kind {
        VoiceProviderKind::Elevenlabs => Ok(Box::new(ElevenLabsProvider::new(settings))),
        VoiceProviderKind::ElevenlabsSdk => Err(VoiceError::Unsupported(
            "elevenlabs-sdk sessions run in the vendor's hosted agent".to_string(),
        )),
    }
}

struct ActiveRecording {
    source: Box<dyn AudioSource>,
    collector: JoinHandle<Vec<f32>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TtsRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
    model_id: &'a str,
}

#[derive(Deserialize)]
struct SttResponse {
    text: Option<String>,
}

/// Request/response provider backed by the server's vendor proxy routes.
///
/// The vendor credential stays on the server; this client only knows the
/// proxy's base URL.
pub struct ElevenLabsProvider {
    settings: ProviderSettings,
    http: reqwest::Client,
    voice: Option<PrototypeVoice>,
    recording: Option<ActiveRecording>,
}

impl ElevenLabsProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
            voice: None,
            recording: None,
        }
    }

    fn voice(&self) -> Result<&PrototypeVoice, VoiceError> {
        self.voice.as_ref().ok_or(VoiceError::NotInitialized)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.proxy_base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl VoiceProvider for ElevenLabsProvider {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    async fn initialize(&mut self, config: PrototypeVoice) -> Result<(), VoiceError> {
        if config.provider != VoiceProviderKind::Elevenlabs {
            return Err(VoiceError::Unsupported(format!(
                "{:?} configuration (agent {}) given to elevenlabs provider",
                config.provider,
                config.agent_id().unwrap_or("unset")
            )));
        }
        self.voice = Some(config);
        Ok(())
    }

    async fn start_recording(
        &mut self,
        mut source: Box<dyn AudioSource>,
    ) -> Result<(), VoiceError> {
        self.cleanup();
        source.request_access()?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<f32>>();
        let collector = tokio::spawn(async move {
            let mut samples = Vec::new();
            while let Some(block) = rx.recv().await {
                samples.extend_from_slice(&block);
            }
            samples
        });
        source.start(self.settings.sample_rate, tx)?;
        self.recording = Some(ActiveRecording { source, collector });
        info!("recording started");
        Ok(())
    }

    async fn stop_recording(&mut self) -> Result<Recording, VoiceError> {
        let ActiveRecording {
            mut source,
            collector,
        } = self.recording.take().ok_or(VoiceError::NoActiveRecording)?;
        source.stop();
        drop(source);

        let mut samples = collector
            .await
            .map_err(|e| VoiceError::Stt(format!("recording collector failed: {e}")))?;
        if let Some(limit) = self.voice.as_ref().and_then(PrototypeVoice::max_duration_secs) {
            let max_samples = (limit as usize).saturating_mul(self.settings.sample_rate as usize);
            if samples.len() > max_samples {
                debug!(limit_secs = limit, dropped = samples.len() - max_samples, "recording over maximum duration");
                samples.truncate(max_samples);
            }
        }
        let recording = Recording {
            samples: samples.into_iter().map(encode_sample).collect(),
            sample_rate: self.settings.sample_rate,
        };
        info!(
            samples = recording.samples.len(),
            duration_ms = recording.duration().as_millis() as u64,
            "recording stopped"
        );
        Ok(recording)
    }

    async fn synthesize_speech(&self, text: &str) -> Result<SpeechAudio, VoiceError> {
        let voice = self.voice()?;
        let response = self
            .http
            .post(self.url("tts"))
            .json(&TtsRequest {
                text,
                voice_id: voice.voice_id_or_default(),
                model_id: voice.model_or_default(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!("{status}: {body}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let data = response.bytes().await?;
        debug!(bytes = data.len(), content_type = %content_type, "speech synthesised");
        Ok(SpeechAudio { content_type, data })
    }

    async fn transcribe(&self, recording: &Recording) -> Result<String, VoiceError> {
        self.voice()?;
        let wav = recording.to_wav()?;
        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("recording.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model_id", STT_MODEL_ID);

        let response = self.http.post(self.url("stt")).multipart(form).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::Stt(format!("{status}: {body}")));
        }

        let parsed: SttResponse = response.json().await?;
        parsed
            .text
            .ok_or_else(|| VoiceError::Stt("response carried no text".to_string()))
    }

    async fn process_message(&self, message: &str) -> Result<String, VoiceError> {
        self.voice()?;
        Ok(format!(
            "I heard you say: \"{message}\". This is a test response from the sandbox."
        ))
    }

    fn cleanup(&mut self) {
        if let Some(mut active) = self.recording.take() {
            active.source.stop();
            active.collector.abort();
            debug!("discarded active recording");
        }
    }
}
