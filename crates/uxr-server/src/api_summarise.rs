//! `POST /api/summarise`: research summary of a finished conversation.

use crate::error::ProxyError;
use crate::AppState;
use axum::{extract::rejection::JsonRejection, Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are an AI research assistant. Generate a concise research \
summary in STRICT JSON with the following keys:\n\n\
- themes: array of short strings (2-4 words)\n\
- concise_summary: max 40 words\n\
- quote: the single most illustrative sentence from the user (verbatim)\n\n\
Return ONLY the JSON.";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationMessage {
    pub role: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummariseRequest {
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
}

#[derive(Debug, Serialize)]
pub struct SummariseResponse {
    pub summary: Value,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatContent>,
}

#[derive(Deserialize)]
struct ChatContent {
    content: Option<String>,
}

/// Renders the conversation as `User: ...` / `Agent: ...` lines.
pub fn transcript_text(messages: &[ConversationMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let speaker = if m.role == "user" { "User" } else { "Agent" };
            format!("{speaker}: {}", m.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses the model's reply as JSON, keeping it verbatim under `raw` when it
/// is not.
pub fn parse_summary(content: &str) -> Value {
    serde_json::from_str(content).unwrap_or_else(|_| json!({ "raw": content }))
}

/// Handler for `POST /api/summarise`.
///
/// A body whose `messages` is not a list of messages reads as an empty
/// conversation; a body that is not JSON at all is a server error.
pub async fn summarise_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<SummariseRequest>, JsonRejection>,
) -> Result<Json<SummariseResponse>, ProxyError> {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(JsonRejection::JsonDataError(e)) => {
            tracing::debug!("summarise body has no usable messages: {}", e.body_text());
            SummariseRequest::default()
        }
        Err(rejection) => return Err(rejection.into()),
    };
    if payload.messages.is_empty() {
        return Err(ProxyError::BadRequest("No messages".to_string()));
    }

    let key = state
        .credentials
        .completions
        .as_ref()
        .ok_or(ProxyError::MissingKey("Missing OpenAI key"))?;

    let transcript = transcript_text(&payload.messages);
    tracing::debug!(
        messages = payload.messages.len(),
        chars = transcript.len(),
        "summarising transcript"
    );

    let settings = &state.config.summarise;
    let upstream = state
        .http
        .post(&settings.completions_url)
        .bearer_auth(key.expose())
        .json(&ChatRequest {
            model: &settings.model,
            temperature: settings.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &transcript,
                },
            ],
        })
        .send()
        .await?;

    if !upstream.status().is_success() {
        let status = upstream.status();
        let body = upstream.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "completion upstream error");
        return Err(ProxyError::Transport(body));
    }

    let reply: ChatResponse = upstream.json().await?;
    let content = reply
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .unwrap_or_else(|| "{}".to_string());

    Ok(Json(SummariseResponse {
        summary: parse_summary(&content),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, text: &str) -> ConversationMessage {
        ConversationMessage {
            role: role.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn transcript_labels_speakers() {
        let text = transcript_text(&[
            msg("user", "The app froze."),
            msg("assistant", "When did that happen?"),
            msg("user", "At checkout."),
        ]);
        assert_eq!(
            text,
            "User: The app froze.\nAgent: When did that happen?\nUser: At checkout."
        );
    }

    #[test]
    fn non_json_reply_is_kept_raw() {
        assert_eq!(parse_summary("not json"), json!({ "raw": "not json" }));
        assert_eq!(
            parse_summary(r#"{"themes":["checkout bugs"]}"#)["themes"][0],
            "checkout bugs"
        );
    }
}
