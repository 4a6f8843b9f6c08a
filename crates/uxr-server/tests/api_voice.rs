use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path},
    http::{header, HeaderMap, Request, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower::ServiceExt;
use uxr_server::api_voice::MAX_UPLOAD_BYTES;
use uxr_server::config::{ApiKey, Config, Credentials};
use uxr_server::{app, AppState};

#[derive(Default)]
struct Seen {
    voice_id: Option<String>,
    api_key: Option<String>,
    body: Option<Value>,
    stt_content_type: Option<String>,
    stt_body: Option<Vec<u8>>,
}

async fn spawn(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Stand-in for the vendor REST API. Voice `broken` fails with 401.
async fn fake_vendor_api(seen: Arc<Mutex<Seen>>) -> String {
    let tts_seen = seen.clone();
    let stt_seen = seen;
    let router = Router::new()
        .route(
            "/v1/text-to-speech/{voice_id}",
            post(
                move |Path(voice_id): Path<String>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    let mut seen = tts_seen.lock().unwrap();
                    seen.api_key = headers
                        .get("xi-api-key")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    seen.body = Some(body);
                    seen.voice_id = Some(voice_id.clone());
                    if voice_id == "broken" {
                        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
                    }
                    ([(header::CONTENT_TYPE, "audio/ogg")], vec![0x4fu8, 0x67, 0x67]).into_response()
                },
            ),
        )
        .route(
            "/v1/speech-to-text",
            post(move |headers: HeaderMap, body: Bytes| async move {
                let mut seen = stt_seen.lock().unwrap();
                seen.stt_content_type = headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                seen.stt_body = Some(body.to_vec());
                if body.is_empty() {
                    return (StatusCode::UNPROCESSABLE_ENTITY, "").into_response();
                }
                Json(json!({ "text": "hello there", "language_code": "en" })).into_response()
            }),
        );
    format!("http://{}/v1", spawn(router).await)
}

fn state(api_base_url: &str, key: Option<&str>) -> AppState {
    let mut config = Config::default();
    config.vendor.api_base_url = api_base_url.to_string();
    AppState::new(
        config,
        Credentials {
            vendor: key.and_then(ApiKey::new),
            completions: None,
        },
    )
}

async fn relay_server(api_base_url: &str, key: Option<&str>) -> String {
    format!("http://{}", spawn(app(state(api_base_url, key))).await)
}

/// Vendor speech-to-text endpoint counting the uploads it fully received.
async fn counting_stt_vendor(hits: Arc<AtomicUsize>) -> String {
    let router = Router::new().route(
        "/v1/speech-to-text",
        post(move |_body: Bytes| async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Json(json!({ "text": "" }))
        })
        .layer(DefaultBodyLimit::disable()),
    );
    format!("http://{}/v1", spawn(router).await)
}

#[tokio::test]
async fn tts_forwards_defaults_and_returns_audio() {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let base = relay_server(&fake_vendor_api(seen.clone()).await, Some("xi-test")).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/voice/elevenlabs/tts"))
        .json(&json!({ "text": "Welcome back" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "audio/ogg"
    );
    assert_eq!(&response.bytes().await.unwrap()[..], b"Ogg");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.voice_id.as_deref(), Some("pNInz6obpgDQGcFmaJgB"));
    assert_eq!(seen.api_key.as_deref(), Some("xi-test"));
    let body = seen.body.as_ref().unwrap();
    assert_eq!(body["text"], "Welcome back");
    assert_eq!(body["model_id"], "eleven_monolingual_v1");
    assert_eq!(body["voice_settings"]["similarity_boost"], 0.8);
    assert_eq!(body["voice_settings"]["use_speaker_boost"], true);
}

#[tokio::test]
async fn tts_passes_upstream_error_status() {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let base = relay_server(&fake_vendor_api(seen).await, Some("xi-test")).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/voice/elevenlabs/tts"))
        .json(&json!({ "text": "hi", "voiceId": "broken", "modelId": "eleven_turbo_v2" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["error"], "invalid api key");
}

#[tokio::test]
async fn tts_without_key_is_server_error() {
    let base = relay_server("http://127.0.0.1:9/v1", None).await;
    let response = reqwest::Client::new()
        .post(format!("{base}/api/voice/elevenlabs/tts"))
        .json(&json!({ "text": "hi" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["error"], "ELEVENLABS_API_KEY not configured");
}

#[tokio::test]
async fn stt_streams_multipart_body_unchanged() {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let base = relay_server(&fake_vendor_api(seen.clone()).await, Some("xi-test")).await;

    let form = reqwest::multipart::Form::new()
        .text("model_id", "scribe_v1")
        .part(
            "file",
            reqwest::multipart::Part::bytes(b"RIFF0000WAVE".to_vec())
                .file_name("recording.wav")
                .mime_str("audio/wav")
                .unwrap(),
        );
    let boundary = form.boundary().to_string();

    let response = reqwest::Client::new()
        .post(format!("{base}/api/voice/elevenlabs/stt"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["text"], "hello there");

    let seen = seen.lock().unwrap();
    let content_type = seen.stt_content_type.as_deref().unwrap();
    assert!(content_type.starts_with("multipart/form-data"));
    assert!(content_type.contains(&boundary));
    let body = String::from_utf8_lossy(seen.stt_body.as_deref().unwrap()).into_owned();
    assert!(body.contains("scribe_v1"));
    assert!(body.contains("RIFF0000WAVE"));
}

#[tokio::test]
async fn stt_rejects_non_multipart() {
    let base = relay_server("http://127.0.0.1:9/v1", Some("xi-test")).await;
    let response = reqwest::Client::new()
        .post(format!("{base}/api/voice/elevenlabs/stt"))
        .json(&json!({ "audio": "nope" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["error"], "Expected multipart/form-data");
}

#[tokio::test]
async fn stt_upstream_failure_without_text_says_stt_failed() {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let base = relay_server(&fake_vendor_api(seen).await, Some("xi-test")).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/voice/elevenlabs/stt"))
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=x")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["error"], "STT failed");
}

#[tokio::test]
async fn stt_refuses_declared_oversize_upload() {
    let hits = Arc::new(AtomicUsize::new(0));
    let vendor = counting_stt_vendor(hits.clone()).await;
    let len = 30 * 1024 * 1024;

    let response = app(state(&vendor, Some("xi-test")))
        .oneshot(
            Request::post("/api/voice/elevenlabs/stt")
                .header(header::CONTENT_TYPE, "multipart/form-data; boundary=x")
                .header(header::CONTENT_LENGTH, len)
                .body(Body::from(vec![0u8; len]))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], format!("Upload exceeds {MAX_UPLOAD_BYTES} bytes"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stt_refuses_streamed_oversize_upload() {
    let hits = Arc::new(AtomicUsize::new(0));
    let vendor = counting_stt_vendor(hits.clone()).await;

    // No Content-Length: 30 chunks of 1 MiB.
    let chunks = futures_util::stream::iter(
        (0..30).map(|_| Ok::<_, std::io::Error>(Bytes::from(vec![0u8; 1024 * 1024]))),
    );
    let response = app(state(&vendor, Some("xi-test")))
        .oneshot(
            Request::post("/api/voice/elevenlabs/stt")
                .header(header::CONTENT_TYPE, "multipart/form-data; boundary=x")
                .body(Body::from_stream(chunks))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stt_accepts_upload_within_limit() {
    let hits = Arc::new(AtomicUsize::new(0));
    let vendor = counting_stt_vendor(hits.clone()).await;

    let response = app(state(&vendor, Some("xi-test")))
        .oneshot(
            Request::post("/api/voice/elevenlabs/stt")
                .header(header::CONTENT_TYPE, "multipart/form-data; boundary=x")
                .body(Body::from(vec![0u8; 1024 * 1024]))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn tts_malformed_body_is_json_server_error() {
    let base = relay_server("http://127.0.0.1:9/v1", Some("xi-test")).await;
    let response = reqwest::Client::new()
        .post(format!("{base}/api/voice/elevenlabs/tts"))
        .header(header::CONTENT_TYPE, "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = response.json().await.unwrap();
    assert!(json["error"].as_str().is_some_and(|e| !e.is_empty()));
}
