//! PCM16 audio frames.
//!
//! A frame is one fixed-size block of mono samples sent as a single binary
//! WebSocket message. The payload is a sequence of little-endian `i16`
//! values, one per sample.

use bytes::Bytes;
use thiserror::Error;

/// Capture sample rate expected by the vendor's streaming recogniser.
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Number of samples in one frame.
pub const FRAME_SAMPLES: usize = 4096;

/// Errors produced when interpreting a binary payload as a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The payload length is not a whole number of 16-bit samples.
    #[error("frame payload has odd length {0}")]
    OddLength(usize),
}

/// Converts one floating-point sample to a signed 16-bit sample.
///
/// The input is clamped to `[-1.0, 1.0]`. Negative values scale by 32768 and
/// non-negative values by 32767, so both ends of the range map exactly onto
/// `i16::MIN` and `i16::MAX`. `NaN` encodes as silence.
pub fn encode_sample(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0).round() as i16
    } else {
        (s * 32767.0).round() as i16
    }
}

/// One encoded block of PCM16 audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    payload: Bytes,
}

impl AudioFrame {
    /// Encodes floating-point samples into a frame.
    pub fn from_samples(samples: &[f32]) -> Self {
        let mut payload = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            payload.extend_from_slice(&encode_sample(sample).to_le_bytes());
        }
        Self {
            payload: Bytes::from(payload),
        }
    }

    /// Wraps a binary payload received from the wire.
    pub fn from_bytes(payload: Bytes) -> Result<Self, FrameError> {
        if payload.len() % 2 != 0 {
            return Err(FrameError::OddLength(payload.len()));
        }
        Ok(Self { payload })
    }

    /// Number of samples in the frame.
    pub fn sample_count(&self) -> usize {
        self.payload.len() / 2
    }

    /// Decodes the payload back into samples.
    pub fn samples(&self) -> Vec<i16> {
        self.payload
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    /// Raw little-endian payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Hands the payload over to the transport.
    pub fn into_bytes(self) -> Bytes {
        self.payload
    }
}
