//! Request/response vendor proxies: text-to-speech and file speech-to-text.

use crate::error::ProxyError;
use crate::upstream::API_KEY_HEADER;
use crate::AppState;
use axum::{
    body::Body,
    extract::rejection::JsonRejection,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use futures_util::TryStreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const MISSING_VENDOR_KEY: &str = "ELEVENLABS_API_KEY not configured";

/// Maximum upload accepted by the speech-to-text proxy (25 MiB).
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsRequest {
    #[serde(default)]
    pub text: String,
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.8,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

#[derive(Serialize)]
struct VendorTtsBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// Handler for `POST /api/voice/elevenlabs/tts`.
pub async fn tts_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Response, ProxyError> {
    let Json(payload) = payload?;
    let key = state
        .credentials
        .vendor
        .as_ref()
        .ok_or(ProxyError::MissingKey(MISSING_VENDOR_KEY))?;

    let vendor = &state.config.vendor;
    let voice_id = payload.voice_id.as_deref().unwrap_or(&vendor.default_voice_id);
    let model_id = payload.model_id.as_deref().unwrap_or(&vendor.default_model_id);
    let url = format!(
        "{}/text-to-speech/{}",
        vendor.api_base_url.trim_end_matches('/'),
        voice_id
    );

    tracing::debug!(voice_id, model_id, chars = payload.text.len(), "tts request");
    let upstream = state
        .http
        .post(url)
        .header(API_KEY_HEADER, key.header_value())
        .json(&VendorTtsBody {
            text: &payload.text,
            model_id,
            voice_settings: VoiceSettings::default(),
        })
        .send()
        .await?;

    let status = upstream.status();
    if !status.is_success() {
        let body = upstream.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "tts upstream error");
        return Err(ProxyError::Upstream { status, body });
    }

    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("audio/mpeg"));
    let audio = upstream.bytes().await?;
    tracing::debug!(bytes = audio.len(), "tts audio received");

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        audio,
    )
        .into_response())
}

/// Handler for `POST /api/voice/elevenlabs/stt`.
///
/// The multipart body is streamed to the vendor unchanged under the same
/// content type, boundary included. Uploads over [`MAX_UPLOAD_BYTES`] are
/// refused with 413, up front when `Content-Length` declares them and
/// mid-stream otherwise.
pub async fn stt_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<Value>, ProxyError> {
    let key = state
        .credentials
        .vendor
        .as_ref()
        .ok_or(ProxyError::MissingKey(MISSING_VENDOR_KEY))?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.contains("multipart/form-data") {
        return Err(ProxyError::BadRequest(
            "Expected multipart/form-data".to_string(),
        ));
    }

    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > MAX_UPLOAD_BYTES as u64) {
        return Err(ProxyError::PayloadTooLarge(MAX_UPLOAD_BYTES));
    }

    let overflowed = Arc::new(AtomicBool::new(false));
    let flag = overflowed.clone();
    let mut received = 0usize;
    let limited = body
        .into_data_stream()
        .map_err(|e| -> BoxError { Box::new(e) })
        .and_then(move |chunk| {
            received += chunk.len();
            let result: Result<_, BoxError> = if received > MAX_UPLOAD_BYTES {
                flag.store(true, Ordering::SeqCst);
                Err(ProxyError::PayloadTooLarge(MAX_UPLOAD_BYTES).into())
            } else {
                Ok(chunk)
            };
            std::future::ready(result)
        });

    let url = format!(
        "{}/speech-to-text",
        state.config.vendor.api_base_url.trim_end_matches('/')
    );
    let sent = state
        .http
        .post(url)
        .header(API_KEY_HEADER, key.header_value())
        .header(reqwest::header::CONTENT_TYPE, content_type)
        .body(reqwest::Body::wrap_stream(limited))
        .send()
        .await;
    if overflowed.load(Ordering::SeqCst) {
        tracing::warn!(limit = MAX_UPLOAD_BYTES, "stt upload over limit");
        return Err(ProxyError::PayloadTooLarge(MAX_UPLOAD_BYTES));
    }
    let upstream = sent?;

    let status = upstream.status();
    if !status.is_success() {
        let text = upstream.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "stt upstream error");
        return Err(ProxyError::Upstream {
            status,
            body: if text.is_empty() {
                "STT failed".to_string()
            } else {
                text
            },
        });
    }

    let json: Value = upstream.json().await?;
    Ok(Json(json))
}
