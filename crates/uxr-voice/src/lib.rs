//! Client side of the voice relay.
//!
//! Two ways to talk to the vendor through the server:
//!
//! - [`StreamingTranscriber`] captures audio, streams PCM16 frames over the
//!   relay WebSocket and returns the final transcript on stop.
//! - [`VoiceProvider`] records a whole utterance, then transcribes and
//!   synthesises through the server's request/response proxies.

pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod provider;
pub mod source;

pub use capture::{StreamingTranscriber, TranscriptListener};
pub use config::{CaptureConfig, ProviderSettings};
pub use error::{CaptureError, VoiceError};
pub use frame::FrameAccumulator;
pub use provider::{build_provider, ElevenLabsProvider, Recording, SpeechAudio, VoiceProvider};
#[cfg(feature = "microphone")]
pub use source::MicrophoneSource;
pub use source::{AudioSource, ReplaySource, SampleSink};
