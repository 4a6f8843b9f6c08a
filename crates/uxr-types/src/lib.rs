//! Shared message contract for the UXR voice relay.
//!
//! This crate provides the types that both ends of the realtime audio relay
//! agree on: the PCM16 audio frame encoding sent browser → proxy → vendor,
//! the JSON transcript events sent vendor → proxy → browser, the `stop`
//! control message, and the append-only final transcript.
//!
//! It also carries the prototype voice table so the server and the client
//! resolve a prototype name to the same vendor voice.

pub mod audio;
pub mod event;
pub mod prototype;
pub mod transcript;

pub use audio::{encode_sample, AudioFrame, FrameError, FRAME_SAMPLES, SAMPLE_RATE_HZ};
pub use event::{ControlMessage, TranscriptEvent};
pub use prototype::{voice_config, PrototypeVoice, UnknownPrototype, VoiceProviderKind, PROTOTYPES};
pub use transcript::FinalTranscript;
