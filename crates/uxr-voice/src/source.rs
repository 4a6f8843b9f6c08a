//! Audio input seam for the capture pipeline.
//!
//! A source delivers blocks of mono `f32` samples in `[-1.0, 1.0]` into a
//! channel. Block lengths are whatever the device produces; the pipeline
//! re-blocks them into fixed-size frames.

use crate::error::CaptureError;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Receiving end of a source's sample blocks.
pub type SampleSink = mpsc::UnboundedSender<Vec<f32>>;

/// A live or simulated audio input.
pub trait AudioSource: Send + Sync {
    /// Acquires the input device. Fails with
    /// [`CaptureError::PermissionDenied`] when the user or OS refuses.
    fn request_access(&mut self) -> Result<(), CaptureError>;

    /// Begins delivering sample blocks into `sink`.
    fn start(&mut self, sample_rate: u32, sink: SampleSink) -> Result<(), CaptureError>;

    /// Disconnects the source. No block is delivered after this returns.
    fn stop(&mut self);
}

/// Plays back pre-recorded sample blocks.
///
/// Used for demos and tests in place of a microphone.
pub struct ReplaySource {
    blocks: Vec<Vec<f32>>,
    pace: Duration,
    deny_access: bool,
    task: Option<JoinHandle<()>>,
}

impl ReplaySource {
    pub fn new(blocks: Vec<Vec<f32>>) -> Self {
        Self {
            blocks,
            pace: Duration::ZERO,
            deny_access: false,
            task: None,
        }
    }

    /// Splits a continuous recording into blocks of `block_len` samples.
    pub fn from_samples(samples: &[f32], block_len: usize) -> Self {
        let block_len = block_len.max(1);
        Self::new(samples.chunks(block_len).map(<[f32]>::to_vec).collect())
    }

    /// A source whose access request is always refused.
    pub fn denied() -> Self {
        let mut source = Self::new(Vec::new());
        source.deny_access = true;
        source
    }

    /// Delivers one block per `pace` instead of all at once.
    pub fn paced(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }
}

impl AudioSource for ReplaySource {
    fn request_access(&mut self) -> Result<(), CaptureError> {
        if self.deny_access {
            return Err(CaptureError::PermissionDenied(
                "replay source configured to refuse access".to_string(),
            ));
        }
        Ok(())
    }

    fn start(&mut self, _sample_rate: u32, sink: SampleSink) -> Result<(), CaptureError> {
        let blocks = std::mem::take(&mut self.blocks);
        if self.pace.is_zero() {
            for block in blocks {
                if sink.send(block).is_err() {
                    break;
                }
            }
            return Ok(());
        }

        let pace = self.pace;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pace);
            for block in blocks {
                ticker.tick().await;
                if sink.send(block).is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "microphone")]
pub use microphone::MicrophoneSource;

#[cfg(feature = "microphone")]
mod microphone {
    use super::{AudioSource, SampleSink};
    use crate::error::CaptureError;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, SampleRate, StreamConfig};
    use std::sync::mpsc as std_mpsc;
    use std::thread::JoinHandle;
    use tracing::{error, info, warn};

    /// Captures from a system input device through cpal.
    ///
    /// cpal streams are not `Send` on every platform, so the stream is built,
    /// played and dropped on a dedicated thread that lives until `stop`.
    #[derive(Default)]
    pub struct MicrophoneSource {
        device_name: Option<String>,
        worker: Option<(std_mpsc::Sender<()>, JoinHandle<()>)>,
    }

    impl MicrophoneSource {
        /// Uses the host's default input device.
        pub fn new() -> Self {
            Self::default()
        }

        /// Uses the first input device whose name contains `name`.
        pub fn with_device(name: impl Into<String>) -> Self {
            Self {
                device_name: Some(name.into()),
                worker: None,
            }
        }
    }

    fn find_device(name: Option<&str>) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        match name {
            None => host.default_input_device().ok_or(CaptureError::NoInputDevice),
            Some(wanted) => host
                .input_devices()
                .map_err(|e| CaptureError::Device(e.to_string()))?
                .find(|d| d.name().map(|n| n.contains(wanted)).unwrap_or(false))
                .ok_or(CaptureError::NoInputDevice),
        }
    }

    /// Picks a config at `sample_rate` if the device supports it, else the
    /// device default (blocks are then resampled in the callback).
    fn pick_config(
        device: &cpal::Device,
        sample_rate: u32,
    ) -> Result<(StreamConfig, SampleFormat), CaptureError> {
        let target = SampleRate(sample_rate);
        if let Ok(ranges) = device.supported_input_configs() {
            for range in ranges {
                if range.min_sample_rate() <= target && target <= range.max_sample_rate() {
                    let supported = range.with_sample_rate(target);
                    return Ok((supported.config(), supported.sample_format()));
                }
            }
        }
        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::Device(e.to_string()))?;
        warn!(
            device_rate = supported.sample_rate().0,
            target_rate = sample_rate,
            "input device does not support target rate, resampling"
        );
        Ok((supported.config(), supported.sample_format()))
    }

    /// Averages interleaved channels and linearly resamples to `to` Hz.
    fn to_mono(data: &[f32], channels: usize, from: u32, to: u32) -> Vec<f32> {
        let mono: Vec<f32> = if channels > 1 {
            data.chunks(channels)
                .map(|c| c.iter().sum::<f32>() / channels as f32)
                .collect()
        } else {
            data.to_vec()
        };
        if from == to || mono.is_empty() {
            return mono;
        }
        let ratio = from as f64 / to as f64;
        let out_len = (mono.len() as f64 / ratio).floor() as usize;
        (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = pos.floor() as usize;
                let frac = (pos - idx as f64) as f32;
                let a = mono[idx];
                let b = mono.get(idx + 1).copied().unwrap_or(a);
                a + (b - a) * frac
            })
            .collect()
    }

    fn build_stream(
        device: &cpal::Device,
        sample_rate: u32,
        sink: SampleSink,
    ) -> Result<cpal::Stream, CaptureError> {
        let (config, format) = pick_config(device, sample_rate)?;
        let channels = config.channels as usize;
        let device_rate = config.sample_rate.0;
        let on_error = |err| error!("audio stream error: {}", err);

        let stream = match format {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = sink.send(to_mono(data, channels, device_rate, sample_rate));
                },
                on_error,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let floats: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                    let _ = sink.send(to_mono(&floats, channels, device_rate, sample_rate));
                },
                on_error,
                None,
            ),
            other => {
                return Err(CaptureError::Device(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        }
        .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;
        Ok(stream)
    }

    impl AudioSource for MicrophoneSource {
        fn request_access(&mut self) -> Result<(), CaptureError> {
            let device = find_device(self.device_name.as_deref())?;
            device
                .default_input_config()
                .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;
            info!(
                device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
                "microphone access granted"
            );
            Ok(())
        }

        fn start(&mut self, sample_rate: u32, sink: SampleSink) -> Result<(), CaptureError> {
            let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), CaptureError>>();
            let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
            let device_name = self.device_name.clone();

            let handle = std::thread::spawn(move || {
                let stream = find_device(device_name.as_deref())
                    .and_then(|device| build_stream(&device, sample_rate, sink));
                match stream {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Blocks until stop() sends or drops the handle.
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            });

            match ready_rx.recv() {
                Ok(Ok(())) => {
                    self.worker = Some((stop_tx, handle));
                    info!(sample_rate, "microphone capture started");
                    Ok(())
                }
                Ok(Err(e)) => {
                    let _ = handle.join();
                    Err(e)
                }
                Err(_) => Err(CaptureError::Device(
                    "capture thread exited before start".to_string(),
                )),
            }
        }

        fn stop(&mut self) {
            if let Some((stop_tx, handle)) = self.worker.take() {
                let _ = stop_tx.send(());
                if handle.join().is_err() {
                    warn!("microphone capture thread panicked");
                }
                info!("microphone capture stopped");
            }
        }
    }

    impl Drop for MicrophoneSource {
        fn drop(&mut self) {
            self.stop();
        }
    }

    #[cfg(test)]
    mod tests {
        use super::to_mono;

        #[test]
        fn stereo_is_averaged() {
            let mono = to_mono(&[0.5, 0.1, -1.0, 1.0], 2, 16_000, 16_000);
            assert_eq!(mono.len(), 2);
            assert!((mono[0] - 0.3).abs() < 1e-6);
            assert!(mono[1].abs() < 1e-6);
        }

        #[test]
        fn downsampling_halves_length() {
            let input: Vec<f32> = (0..96).map(|i| i as f32 / 96.0).collect();
            assert_eq!(to_mono(&input, 1, 32_000, 16_000).len(), 48);
        }
    }
}
