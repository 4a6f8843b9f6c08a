use thiserror::Error;

/// Failures of the capture-and-encode pipeline.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("no audio input device available")]
    NoInputDevice,

    #[error("audio device error: {0}")]
    Device(String),

    #[error("relay connection failed: {0}")]
    Connection(String),

    #[error("a capture session is already active")]
    AlreadyStarted,

    #[error("capture start was cancelled by stop")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("provider not initialized")]
    NotInitialized,

    #[error("unsupported provider: {0}")]
    Unsupported(String),

    #[error("no active recording")]
    NoActiveRecording,

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("audio encoding error: {0}")]
    Encode(#[from] hound::Error),
}
