//! `GET /api/voice/elevenlabs/stream`: duplex relay between the browser and
//! the vendor's streaming speech-to-text socket.

use crate::error::RelayError;
use crate::relay::{self, RelaySession, RelayState};
use crate::{upstream, AppState};
use axum::{
    extract::ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Extension,
};
use std::sync::{Arc, Mutex};

fn wants_websocket(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
}

/// Handler for `GET /api/voice/elevenlabs/stream`.
///
/// The upstream socket is opened before the browser's upgrade is accepted,
/// so a browser only ever sees `101` once the vendor is reachable.
pub async fn stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !wants_websocket(&headers) {
        return RelayError::UpgradeRejected.into_response();
    }

    let Some(key) = state.credentials.vendor.as_ref() else {
        tracing::error!("stream requested but ELEVENLABS_API_KEY is not set");
        return RelayError::Configuration.into_response();
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!("websocket upgrade rejected: {}", rejection);
            return RelayError::UpgradeRejected.into_response();
        }
    };

    let mut session = RelaySession::new();
    let call_id = session.call_id();
    session.transition(RelayState::UpstreamConnecting);

    let vendor = &state.config.vendor;
    let upstream = match upstream::connect(&vendor.stream_url, key, vendor.connect_timeout()).await {
        Ok(socket) => socket,
        Err(e) => {
            if let RelayError::UpstreamConnection(detail) = &e {
                tracing::warn!(call_id = %call_id, "upstream connection failed: {}", detail);
            }
            session.transition(RelayState::Closed);
            return e.into_response();
        }
    };
    session.transition(RelayState::UpstreamReady);

    // Whichever upgrade outcome runs first takes the vendor leg.
    let pending = Arc::new(Mutex::new(Some((upstream, session))));
    let on_failure = pending.clone();
    ws.on_failed_upgrade(move |e| {
        tracing::warn!(call_id = %call_id, "browser upgrade failed after upstream open: {}", e);
        if let Some((upstream, session)) = take_pending(&on_failure) {
            tokio::spawn(relay::abandon_upstream(upstream, session));
        }
    })
    .on_upgrade(move |socket| async move {
        if let Some((upstream, session)) = take_pending(&pending) {
            relay::run_relay(socket, upstream, session).await;
        }
    })
}

type PendingCall = Arc<Mutex<Option<(upstream::VendorSocket, RelaySession)>>>;

fn take_pending(slot: &PendingCall) -> Option<(upstream::VendorSocket, RelaySession)> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take()
}
