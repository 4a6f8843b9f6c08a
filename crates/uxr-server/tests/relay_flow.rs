use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_hdr_async, connect_async};
use uxr_server::config::{ApiKey, Config, Credentials};
use uxr_server::{app, AppState};

const STOP: &str = r#"{"event":"stop"}"#;

struct FakeVendor {
    url: String,
    api_key: Arc<Mutex<Option<String>>>,
    /// Every message the vendor received, in order, once its socket ends.
    received: oneshot::Receiver<Vec<Message>>,
}

/// Vendor that greets with a binary blob, answers each binary frame with a
/// partial carrying the frame length, and answers `stop` with a final and a
/// close.
async fn fake_vendor() -> FakeVendor {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/v1/speech-to-text/stream", listener.local_addr().unwrap());
    let api_key = Arc::new(Mutex::new(None));
    let seen_key = api_key.clone();
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_hdr_async(tcp, move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            *seen_key.lock().unwrap() = req
                .headers()
                .get("xi-api-key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok(resp)
        })
        .await
        .unwrap();

        ws.send(Message::Binary(vec![7u8, 8, 9].into())).await.unwrap();

        let mut received = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            let reply = match &msg {
                Message::Binary(data) => format!(
                    r#"{{"type":"transcript_partial","text":"{}"}}"#,
                    data.len()
                ),
                Message::Text(text) if text.as_str() == STOP => {
                    r#"{"type":"transcript_final","text":"done"}"#.to_string()
                }
                Message::Close(_) => break,
                _ => continue,
            };
            let stop = msg.is_text();
            received.push(msg);
            ws.send(Message::Text(reply.into())).await.unwrap();
            if stop {
                let _ = ws.close(None).await;
                break;
            }
        }
        let _ = done_tx.send(received);
    });

    FakeVendor {
        url,
        api_key,
        received: done_rx,
    }
}

async fn serve(stream_url: &str) -> SocketAddr {
    let mut config = Config::default();
    config.vendor.stream_url = stream_url.to_string();
    let state = AppState::new(
        config,
        Credentials {
            vendor: ApiKey::new("xi-relay-test"),
            completions: None,
        },
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    addr
}

async fn next_data(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> Option<Message> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("relay went quiet")?;
        match msg {
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Ok(other) => return Some(other),
            Err(_) => return None,
        }
    }
}

#[tokio::test]
async fn relays_both_directions_unchanged() {
    let vendor = fake_vendor().await;
    let addr = serve(&vendor.url).await;

    let (mut browser, response) =
        connect_async(format!("ws://{addr}/api/voice/elevenlabs/stream"))
            .await
            .unwrap();
    assert_eq!(response.status().as_u16(), 101);

    // Vendor → browser binary arrives as-is.
    assert_eq!(
        next_data(&mut browser).await,
        Some(Message::Binary(vec![7u8, 8, 9].into()))
    );

    // Browser → vendor binary frame, answered with a partial.
    browser
        .send(Message::Binary(vec![0u8; 8192].into()))
        .await
        .unwrap();
    assert_eq!(
        next_data(&mut browser).await,
        Some(Message::Text(
            r#"{"type":"transcript_partial","text":"8192"}"#.into()
        ))
    );

    browser.send(Message::Text(STOP.into())).await.unwrap();
    assert_eq!(
        next_data(&mut browser).await,
        Some(Message::Text(
            r#"{"type":"transcript_final","text":"done"}"#.into()
        ))
    );

    // The vendor closed, so the relay closes the browser leg too.
    assert!(matches!(
        next_data(&mut browser).await,
        None | Some(Message::Close(_))
    ));

    let received = vendor.received.await.unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0], Message::Binary(vec![0u8; 8192].into()));
    assert_eq!(received[1], Message::Text(STOP.into()));
    assert_eq!(
        vendor.api_key.lock().unwrap().as_deref(),
        Some("xi-relay-test")
    );
}

#[tokio::test]
async fn browser_close_closes_vendor_leg() {
    let vendor = fake_vendor().await;
    let addr = serve(&vendor.url).await;

    let (mut browser, _) = connect_async(format!("ws://{addr}/api/voice/elevenlabs/stream"))
        .await
        .unwrap();
    assert!(matches!(
        next_data(&mut browser).await,
        Some(Message::Binary(_))
    ));

    browser.close(None).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), vendor.received)
        .await
        .expect("vendor leg was not closed")
        .unwrap();
    assert!(received.is_empty());
}

/// Vendor serving any number of calls, each answering binary frames with a
/// partial carrying the frame length.
async fn echo_vendor() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/stream", listener.local_addr().unwrap());
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                while let Some(Ok(Message::Binary(data))) = ws.next().await {
                    let partial = format!(
                        r#"{{"type":"transcript_partial","text":"{}"}}"#,
                        data.len()
                    );
                    if ws.send(Message::Text(partial.into())).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    url
}

#[tokio::test]
async fn calls_are_independent() {
    let addr = serve(&echo_vendor().await).await;
    let stream_url = format!("ws://{addr}/api/voice/elevenlabs/stream");

    let (mut a, _) = connect_async(stream_url.as_str()).await.unwrap();
    let (mut b, _) = connect_async(stream_url.as_str()).await.unwrap();

    a.send(Message::Binary(vec![1u8; 4].into())).await.unwrap();
    assert!(matches!(next_data(&mut a).await, Some(Message::Text(_))));

    // Ending one call leaves the other relaying.
    a.close(None).await.unwrap();
    b.send(Message::Binary(vec![1u8; 16].into())).await.unwrap();
    assert_eq!(
        next_data(&mut b).await,
        Some(Message::Text(
            r#"{"type":"transcript_partial","text":"16"}"#.into()
        ))
    );
}
