//! Chat, history, feedback, and the upload boundary.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub file_context: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }

    let platform = body.platform.as_deref().unwrap_or("main_ui");
    let outcome = state
        .runtime
        .handle_chat(&body.message, body.file_context, platform)
        .await
        .map_err(|err| ApiError::Upstream(err.to_string()))?;

    Ok(Json(json!({
        "response": outcome.response,
        "confidence": outcome.confidence,
        "ai_name": outcome.ai_name,
        "personality": state.runtime.personality.values(),
        "actions": outcome.actions,
    })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let messages = state.runtime.store.recent_messages(query.limit.min(500))?;
    let total = state.runtime.store.message_count()?;
    Ok(Json(json!({ "messages": messages, "total": total })))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    #[serde(rename = "type")]
    pub feedback_type: String,
    pub message_id: i64,
}

pub async fn feedback(
    State(state): State<AppState>,
    Json(body): Json<FeedbackRequest>,
) -> Result<Json<Value>, ApiError> {
    if !["positive", "negative", "correction"].contains(&body.feedback_type.as_str()) {
        return Err(ApiError::bad_request(
            "type must be positive, negative, or correction",
        ));
    }
    // Writes the feedback column and shifts the emotional state.
    let applied = state
        .runtime
        .apply_feedback(body.message_id, &body.feedback_type)
        .await?;
    if !applied {
        return Err(ApiError::not_found("message not found"));
    }
    Ok(Json(json!({ "status": "recorded" })))
}

/// Upload boundary. Binary-format extraction is an external collaborator's
/// job; this endpoint accepts already-extracted text, persists it under
/// data/uploads/, and echoes the content for context injection.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub filename: String,
    pub content: String,
}

pub async fn upload(
    State(state): State<AppState>,
    Json(body): Json<UploadRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.filename.contains('/') || body.filename.contains("..") {
        return Err(ApiError::bad_request("invalid filename"));
    }
    if body.content.is_empty() {
        return Err(ApiError::bad_request("content must not be empty"));
    }

    let uploads = state.runtime.base_dir().join("data").join("uploads");
    std::fs::create_dir_all(&uploads)?;
    std::fs::write(uploads.join(&body.filename), &body.content)?;
    state
        .runtime
        .store
        .log_activity("upload", "document uploaded", &body.filename, None)?;

    Ok(Json(json!({
        "filename": body.filename,
        "content": body.content,
        "word_count": body.content.split_whitespace().count(),
    })))
}
