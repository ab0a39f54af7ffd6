//! Stats, activity log, threads, and backups.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{ApiError, AppState};

pub async fn stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let runtime = &state.runtime;
    let curiosity = runtime.store.curiosity_counts()?;
    let episodes = runtime.memory.stats()?;
    Ok(Json(json!({
        "ai_name": runtime.ai_name(),
        "uptime_secs": runtime.uptime_secs(),
        "conversations": runtime.store.user_message_count()?,
        "messages": runtime.store.message_count()?,
        "knowledge_entries": runtime.store.knowledge_count()?,
        "journal_entries": runtime.store.journal_count()?,
        "interests": runtime.store.interest_count()?,
        "active_goals": runtime.store.active_goal_count()?,
        "curiosity": curiosity,
        "episodes": episodes,
        "moltbook_posts": runtime.store.moltbook_post_count()?,
        "last_consolidation": runtime.store.last_consolidation()?,
        "personality_changes": runtime.store.personality_history_count()?,
    })))
}

pub async fn activity_log(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({ "activity": state.runtime.store.recent_activity(50)? })))
}

#[derive(Debug, Deserialize)]
pub struct LogActivityRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    pub label: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub extra: Option<String>,
}

pub async fn log_activity(
    State(state): State<AppState>,
    Json(body): Json<LogActivityRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.event_type.trim().is_empty() || body.label.trim().is_empty() {
        return Err(ApiError::bad_request("type and label are required"));
    }
    state.runtime.store.log_activity(
        &body.event_type,
        &body.label,
        &body.detail,
        body.extra.as_deref(),
    )?;
    Ok(Json(json!({ "status": "logged" })))
}

pub async fn threads(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({ "threads": state.threads.threads(30)? })))
}

pub async fn thread_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let Some(thread) = state.runtime.store.thread_by_id(id)? else {
        return Err(ApiError::not_found("thread not found"));
    };
    let messages = state.runtime.store.thread_messages(id)?;
    Ok(Json(json!({ "thread": thread, "messages": messages })))
}

pub async fn rebuild_threads(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let threads = state.threads.clone();
    // Rebuilds can walk the whole chat log; keep the request thread free.
    let rebuilt = tokio::task::spawn_blocking(move || threads.rebuild()).await??;
    Ok(Json(json!({ "status": "rebuilt", "messages_threaded": rebuilt })))
}

pub async fn backups(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({ "backups": state.runtime.backup.list_backups()? })))
}

pub async fn run_backup(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let outcome = state.runtime.backup.run_backup()?;
    state
        .runtime
        .store
        .log_activity("backup", "manual backup", &outcome.filename, None)?;
    Ok(Json(json!({ "backup": outcome })))
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub filename: String,
}

pub async fn restore_backup(
    State(state): State<AppState>,
    Json(body): Json<RestoreRequest>,
) -> Result<Json<Value>, ApiError> {
    let restored = state
        .runtime
        .backup
        .restore_backup(&body.filename)
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    Ok(Json(json!({ "status": "restored", "files": restored })))
}
