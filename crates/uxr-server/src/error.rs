use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Failures of the streaming relay route, answered in plain text before the
/// socket upgrade.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Missing ELEVENLABS_API_KEY")]
    Configuration,

    #[error("Expected WebSocket upgrade")]
    UpgradeRejected,

    /// The upstream socket could not be opened; the detail is logged only.
    #[error("Upstream connection failed")]
    UpstreamConnection(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::UpgradeRejected => StatusCode::BAD_REQUEST,
            RelayError::UpstreamConnection(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Failures of the REST proxies, answered as `{"error": ...}`.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    MissingKey(&'static str),

    #[error("{0}")]
    BadRequest(String),

    /// The request body could not be read as the expected JSON.
    #[error("{0}")]
    InvalidBody(String),

    #[error("Upload exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// Upstream answered with a non-success status.
    #[error("{body}")]
    Upstream { status: StatusCode, body: String },

    #[error("{0}")]
    Transport(String),
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        ProxyError::Transport(err.to_string())
    }
}

impl From<JsonRejection> for ProxyError {
    fn from(rejection: JsonRejection) -> Self {
        ProxyError::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::MissingKey(_) | ProxyError::InvalidBody(_) | ProxyError::Transport(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Upstream { status, .. } => *status,
        };

        let body = Json(serde_json::json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
