//! Bidirectional message pump between the browser and the vendor.
//!
//! Both legs are owned by one task for the lifetime of a call. Whichever leg
//! ends first (close frame, error or EOF) stops the pump, and both legs are
//! then closed.

use crate::upstream::VendorSocket;
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures_util::{Sink, SinkExt, StreamExt};
use std::fmt;
use tokio_tungstenite::tungstenite::Message as VendorMessage;
use uuid::Uuid;

/// Lifecycle of one relay call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    UpstreamConnecting,
    UpstreamReady,
    Relaying,
    Closing,
    Closed,
}

impl RelayState {
    pub fn can_transition_to(self, next: RelayState) -> bool {
        use RelayState::*;
        matches!(
            (self, next),
            (Idle, UpstreamConnecting)
                | (UpstreamConnecting, UpstreamReady)
                | (UpstreamConnecting, Closed)
                | (UpstreamReady, Relaying)
                | (UpstreamReady, Closing)
                | (Relaying, Closing)
                | (Closing, Closed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelayState::Idle => "idle",
            RelayState::UpstreamConnecting => "upstream_connecting",
            RelayState::UpstreamReady => "upstream_ready",
            RelayState::Relaying => "relaying",
            RelayState::Closing => "closing",
            RelayState::Closed => "closed",
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call state tracker.
#[derive(Debug)]
pub struct RelaySession {
    call_id: Uuid,
    state: RelayState,
}

impl Default for RelaySession {
    fn default() -> Self {
        Self::new()
    }
}

impl RelaySession {
    pub fn new() -> Self {
        Self {
            call_id: Uuid::new_v4(),
            state: RelayState::Idle,
        }
    }

    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Moves to `next` if the lifecycle allows it. Returns whether it did.
    pub fn transition(&mut self, next: RelayState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                call_id = %self.call_id,
                from = %self.state,
                to = %next,
                "rejected relay state transition"
            );
            return false;
        }
        tracing::debug!(call_id = %self.call_id, from = %self.state, to = %next, "relay state");
        self.state = next;
        true
    }
}

/// Counters reported when a call ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub to_vendor: u64,
    pub to_browser: u64,
    pub bytes_to_vendor: u64,
}

/// Pumps messages until either leg ends, then closes both.
pub async fn run_relay(
    mut browser: WebSocket,
    mut vendor: VendorSocket,
    mut session: RelaySession,
) -> RelayStats {
    session.transition(RelayState::Relaying);
    let call_id = session.call_id();
    tracing::info!(call_id = %call_id, "relay started");

    let mut stats = RelayStats::default();
    let reason: &'static str = loop {
        tokio::select! {
            incoming = browser.recv() => {
                let outgoing = match incoming {
                    Some(Ok(AxumMessage::Binary(data))) => {
                        stats.bytes_to_vendor += data.len() as u64;
                        VendorMessage::Binary(data)
                    }
                    Some(Ok(AxumMessage::Text(text))) => {
                        VendorMessage::Text(text.as_str().to_owned().into())
                    }
                    // Answered by axum on this leg.
                    Some(Ok(AxumMessage::Ping(_) | AxumMessage::Pong(_))) => continue,
                    Some(Ok(AxumMessage::Close(_))) | None => break "browser closed",
                    Some(Err(e)) => {
                        tracing::debug!(call_id = %call_id, "browser leg error: {}", e);
                        break "browser error";
                    }
                };
                if vendor.send(outgoing).await.is_err() {
                    break "vendor send failed";
                }
                stats.to_vendor += 1;
            }
            incoming = vendor.next() => {
                let outgoing = match incoming {
                    Some(Ok(VendorMessage::Text(text))) => {
                        AxumMessage::Text(text.as_str().to_owned().into())
                    }
                    Some(Ok(VendorMessage::Binary(data))) => AxumMessage::Binary(data),
                    // Answered by tungstenite on this leg.
                    Some(Ok(VendorMessage::Ping(_) | VendorMessage::Pong(_) | VendorMessage::Frame(_))) => continue,
                    Some(Ok(VendorMessage::Close(_))) | None => break "vendor closed",
                    Some(Err(e)) => {
                        tracing::debug!(call_id = %call_id, "vendor leg error: {}", e);
                        break "vendor error";
                    }
                };
                if browser.send(outgoing).await.is_err() {
                    break "browser send failed";
                }
                stats.to_browser += 1;
            }
        }
    };

    session.transition(RelayState::Closing);
    close_quietly(&mut vendor, VendorMessage::Close(None)).await;
    close_quietly(&mut browser, AxumMessage::Close(None)).await;
    session.transition(RelayState::Closed);

    tracing::info!(
        call_id = %call_id,
        reason,
        to_vendor = stats.to_vendor,
        to_browser = stats.to_browser,
        bytes = stats.bytes_to_vendor,
        "relay ended"
    );
    stats
}

/// Ends a call whose browser leg never opened, closing the vendor leg.
pub async fn abandon_upstream<S>(mut vendor: S, mut session: RelaySession) -> RelayState
where
    S: Sink<VendorMessage> + Unpin,
    S::Error: fmt::Display,
{
    session.transition(RelayState::Closing);
    close_quietly(&mut vendor, VendorMessage::Close(None)).await;
    session.transition(RelayState::Closed);
    tracing::info!(call_id = %session.call_id(), "relay abandoned before browser upgrade");
    session.state()
}

/// Sends a close frame and shuts the leg down, ignoring every failure.
///
/// Safe to call on a leg that is already closed, or more than once.
pub async fn close_quietly<S, M>(leg: &mut S, close: M)
where
    S: Sink<M> + Unpin,
    S::Error: fmt::Display,
{
    if let Err(e) = leg.send(close).await {
        tracing::trace!("close frame not sent: {}", e);
    }
    if let Err(e) = SinkExt::<M>::close(leg).await {
        tracing::trace!("leg already shut: {}", e);
    }
}
