//! Streaming capture pipeline.
//!
//! [`StreamingTranscriber`] turns an [`AudioSource`] into PCM16 frames sent
//! over a WebSocket to the relay proxy, and collects the transcript events
//! the relay sends back. One session task owns the socket, the sample
//! receiver and the accumulated transcript; the handle talks to it through
//! channels.

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::frame::FrameAccumulator;
use crate::source::AudioSource;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use uxr_types::{ControlMessage, FinalTranscript, TranscriptEvent};

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Observer for transcript activity during a session.
pub trait TranscriptListener: Send + 'static {
    /// Called for every partial transcript, as soon as it arrives.
    fn on_partial(&mut self, text: &str);

    /// Called once if the relay closes the session without a stop.
    fn on_closed(&mut self, _reason: &str) {}
}

impl<F> TranscriptListener for F
where
    F: FnMut(&str) + Send + 'static,
{
    fn on_partial(&mut self, text: &str) {
        self(text)
    }
}

enum Phase {
    Idle,
    Connecting {
        attempt: u64,
        cancel: oneshot::Sender<()>,
    },
    Active(CaptureSession),
    /// The relay ended the session on its own; the source is released and
    /// the task still holds the transcript for `stop`.
    Closed(JoinHandle<FinalTranscript>),
}

struct Shared {
    phase: Mutex<Phase>,
    attempts: Mutex<u64>,
}

impl Shared {
    // A panic while holding the lock cannot leave `Phase` half-written, so a
    // poisoned lock is still usable.
    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_attempt(&self) -> u64 {
        let mut n = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        *n += 1;
        *n
    }

    /// Demotes the session started by `attempt` after the relay closed it.
    fn release_closed(&self, attempt: u64) {
        let mut phase = self.phase();
        if !matches!(&*phase, Phase::Active(session) if session.attempt == attempt) {
            return;
        }
        if let Phase::Active(mut session) = std::mem::replace(&mut *phase, Phase::Idle) {
            // Taking the handle first keeps the drop from aborting the caller.
            if let Some(task) = session.task.take() {
                *phase = Phase::Closed(task);
            }
            drop(session);
            debug!(attempt, "released capture session closed by relay");
        }
    }
}

/// Resets a connecting phase if `start` is dropped before it resolves.
struct ConnectingGuard<'a> {
    shared: &'a Shared,
    attempt: u64,
    armed: bool,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut phase = self.shared.phase();
        if matches!(&*phase, Phase::Connecting { attempt, .. } if *attempt == self.attempt) {
            *phase = Phase::Idle;
        }
    }
}

/// Live pairing of an audio source with a relay session task.
struct CaptureSession {
    attempt: u64,
    source: Box<dyn AudioSource>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<FinalTranscript>>,
}

impl CaptureSession {
    async fn finish(mut self) -> String {
        self.source.stop();
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        match self.task.take() {
            Some(task) => collect(task).await,
            None => String::new(),
        }
    }
}

async fn collect(task: JoinHandle<FinalTranscript>) -> String {
    match task.await {
        Ok(transcript) => {
            debug!(segments = transcript.segments(), "collected final transcript");
            transcript.into_text()
        }
        Err(e) => {
            warn!("capture session task failed: {}", e);
            String::new()
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.source.stop();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Client of the realtime relay.
///
/// Cloning yields another handle to the same session slot, so `stop` can be
/// called from a different task than `start`. At most one session is active
/// per transcriber.
#[derive(Clone)]
pub struct StreamingTranscriber {
    config: Arc<CaptureConfig>,
    shared: Arc<Shared>,
}

impl StreamingTranscriber {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config: Arc::new(config),
            shared: Arc::new(Shared {
                phase: Mutex::new(Phase::Idle),
                attempts: Mutex::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Whether a session is connecting or streaming.
    pub fn is_active(&self) -> bool {
        matches!(
            &*self.shared.phase(),
            Phase::Connecting { .. } | Phase::Active(_)
        )
    }

    /// Acquires the source, connects to the relay and starts streaming.
    ///
    /// Capture begins only after the relay connection is open. A concurrent
    /// [`stop`](Self::stop) while connecting makes this return
    /// [`CaptureError::Cancelled`]. Starting after the relay closed a
    /// session discards that session's transcript.
    pub async fn start<S, L>(&self, mut source: S, listener: L) -> Result<(), CaptureError>
    where
        S: AudioSource + 'static,
        L: TranscriptListener,
    {
        let attempt = self.shared.next_attempt();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        {
            let mut phase = self.shared.phase();
            if matches!(&*phase, Phase::Connecting { .. } | Phase::Active(_)) {
                return Err(CaptureError::AlreadyStarted);
            }
            *phase = Phase::Connecting {
                attempt,
                cancel: cancel_tx,
            };
        }
        let mut guard = ConnectingGuard {
            shared: self.shared.as_ref(),
            attempt,
            armed: true,
        };

        source.request_access()?;

        let url = self.config.relay_url.as_str();
        debug!(url, "connecting to relay");
        let socket = tokio::select! {
            connected = connect_async(url) => match connected {
                Ok((socket, _response)) => socket,
                Err(e) => {
                    warn!(url, "relay connection failed: {}", e);
                    return Err(CaptureError::Connection(e.to_string()));
                }
            },
            _ = cancel_rx => {
                info!("capture start abandoned by stop");
                return Err(CaptureError::Cancelled);
            }
        };

        let installed = {
            let mut phase = self.shared.phase();
            if !matches!(&*phase, Phase::Connecting { attempt: a, .. } if *a == attempt) {
                // stop() ran between the connect completing and this lock.
                Err((socket, CaptureError::Cancelled))
            } else {
                let (sample_tx, sample_rx) = mpsc::unbounded_channel();
                match source.start(self.config.sample_rate, sample_tx) {
                    Err(e) => {
                        *phase = Phase::Idle;
                        Err((socket, e))
                    }
                    Ok(()) => {
                        let (stop_tx, stop_rx) = oneshot::channel();
                        let shared = self.shared.clone();
                        let session = run_session(
                            socket,
                            sample_rx,
                            stop_rx,
                            Box::new(listener),
                            self.config.frame_samples,
                            self.config.stop_grace(),
                        );
                        let task = tokio::spawn(async move {
                            let (transcript, end) = session.await;
                            if end == SessionEnd::Closed {
                                shared.release_closed(attempt);
                            }
                            transcript
                        });
                        *phase = Phase::Active(CaptureSession {
                            attempt,
                            source: Box::new(source),
                            stop_tx: Some(stop_tx),
                            task: Some(task),
                        });
                        Ok(())
                    }
                }
            }
        };
        guard.armed = false;

        match installed {
            Ok(()) => {
                info!(
                    sample_rate = self.config.sample_rate,
                    frame_samples = self.config.frame_samples,
                    "capture started"
                );
                Ok(())
            }
            Err((mut socket, e)) => {
                let _ = socket.close(None).await;
                Err(e)
            }
        }
    }

    /// Ends the session and returns the accumulated final transcript.
    ///
    /// Stops the source, sends the `stop` control message, waits up to the
    /// configured grace period for further finals, then closes the
    /// connection. Returns an empty string when nothing was transcribed or
    /// no session was active. After the relay closed the session, returns
    /// what was transcribed up to the close.
    pub async fn stop(&self) -> String {
        let previous = std::mem::replace(&mut *self.shared.phase(), Phase::Idle);
        match previous {
            Phase::Idle => String::new(),
            Phase::Connecting { cancel, .. } => {
                let _ = cancel.send(());
                String::new()
            }
            Phase::Active(session) => {
                let transcript = session.finish().await;
                info!(chars = transcript.len(), "capture stopped");
                transcript
            }
            Phase::Closed(task) => collect(task).await,
        }
    }

    /// Best-effort teardown of any session. Idempotent and infallible.
    pub fn cleanup(&self) {
        let previous = std::mem::replace(&mut *self.shared.phase(), Phase::Idle);
        match previous {
            Phase::Idle => {}
            Phase::Connecting { cancel, .. } => {
                let _ = cancel.send(());
            }
            Phase::Active(session) => {
                debug!("cleaning up active capture session");
                drop(session);
            }
            Phase::Closed(_) => {}
        }
    }
}

enum CaptureEnd {
    Stopped,
    Closed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Stopped,
    Closed,
}

fn handle_text(text: &str, transcript: &mut FinalTranscript, listener: &mut dyn TranscriptListener) {
    match TranscriptEvent::parse(text) {
        Some(TranscriptEvent::Partial { text }) => listener.on_partial(&text),
        Some(TranscriptEvent::Final { text }) => transcript.push(&text),
        None => trace!(len = text.len(), "ignoring unrecognised relay message"),
    }
}

async fn send_frames(
    socket: &mut RelaySocket,
    frames: &mut FrameAccumulator,
    block: &[f32],
    sent: &mut u64,
) -> Result<(), String> {
    for frame in frames.push(block) {
        socket
            .send(Message::Binary(frame.into_bytes()))
            .await
            .map_err(|e| e.to_string())?;
        *sent += 1;
    }
    Ok(())
}

async fn run_session(
    mut socket: RelaySocket,
    mut samples: mpsc::UnboundedReceiver<Vec<f32>>,
    mut stop_rx: oneshot::Receiver<()>,
    mut listener: Box<dyn TranscriptListener>,
    frame_samples: usize,
    grace: Duration,
) -> (FinalTranscript, SessionEnd) {
    let mut transcript = FinalTranscript::new();
    let mut frames = FrameAccumulator::new(frame_samples);
    let mut sent = 0u64;
    let mut audio_open = true;

    let end = loop {
        tokio::select! {
            _ = &mut stop_rx => break CaptureEnd::Stopped,
            block = samples.recv(), if audio_open => match block {
                Some(block) => {
                    if let Err(e) = send_frames(&mut socket, &mut frames, &block, &mut sent).await {
                        break CaptureEnd::Closed(e);
                    }
                }
                None => audio_open = false,
            },
            msg = socket.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    handle_text(text.as_str(), &mut transcript, listener.as_mut());
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()))
                        .unwrap_or_else(|| "closed without reason".to_string());
                    break CaptureEnd::Closed(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break CaptureEnd::Closed(e.to_string()),
                None => break CaptureEnd::Closed("connection ended".to_string()),
            },
        }
    };

    let outcome = match end {
        CaptureEnd::Stopped => {
            // The source is already stopped; flush what it captured before.
            while let Ok(block) = samples.try_recv() {
                if send_frames(&mut socket, &mut frames, &block, &mut sent)
                    .await
                    .is_err()
                {
                    break;
                }
            }
            frames.reset();
            debug!(frames = sent, "audio input finished, sending stop");

            if socket
                .send(Message::Text(ControlMessage::Stop.to_json().into()))
                .await
                .is_ok()
            {
                let drain = async {
                    while let Some(Ok(msg)) = socket.next().await {
                        match msg {
                            Message::Text(text) => {
                                handle_text(text.as_str(), &mut transcript, listener.as_mut())
                            }
                            Message::Close(_) => break,
                            _ => {}
                        }
                    }
                };
                if tokio::time::timeout(grace, drain).await.is_err() {
                    debug!(grace_ms = grace.as_millis() as u64, "stop grace period elapsed");
                }
            }
            SessionEnd::Stopped
        }
        CaptureEnd::Closed(reason) => {
            warn!(
                frames = sent,
                kept_transcript = !transcript.is_empty(),
                reason = %reason,
                "relay closed the session unexpectedly"
            );
            listener.on_closed(&reason);
            SessionEnd::Closed
        }
    };

    let _ = socket.close(None).await;
    (transcript, outcome)
}
