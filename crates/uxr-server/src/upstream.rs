//! Vendor leg of the streaming relay.

use crate::config::ApiKey;
use crate::error::RelayError;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type VendorSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Header carrying the vendor credential.
pub const API_KEY_HEADER: &str = "xi-api-key";

/// Opens the upstream socket, giving up after `timeout`.
///
/// The credential travels in a sensitive request header so it never shows
/// up in a URL or a logged request line.
pub async fn connect(
    url: &str,
    key: &ApiKey,
    timeout: Duration,
) -> Result<VendorSocket, RelayError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| RelayError::UpstreamConnection(format!("invalid upstream url: {e}")))?;

    request
        .headers_mut()
        .insert(API_KEY_HEADER, key.header_value());

    match tokio::time::timeout(timeout, connect_async(request)).await {
        Ok(Ok((socket, response))) => {
            tracing::debug!(status = response.status().as_u16(), "upstream socket open");
            Ok(socket)
        }
        Ok(Err(e)) => Err(RelayError::UpstreamConnection(e.to_string())),
        Err(_) => Err(RelayError::UpstreamConnection(format!(
            "no handshake within {} ms",
            timeout.as_millis()
        ))),
    }
}
