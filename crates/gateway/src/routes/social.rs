//! Moltbook and web-search endpoints.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{ApiError, AppState};

pub async fn moltbook_log(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({
        "enabled": state.runtime.moltbook.enabled(),
        "log": state.runtime.moltbook.log(30)?,
    })))
}

pub async fn moltbook_feed(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let posts = state
        .runtime
        .moltbook
        .read_feed("hot", 15)
        .await
        .map_err(|err| ApiError::Upstream(err.to_string()))?;
    Ok(Json(json!({ "posts": posts })))
}

#[derive(Debug, Deserialize)]
pub struct MoltbookPostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub submolt: Option<String>,
}

pub async fn moltbook_post(
    State(state): State<AppState>,
    Json(body): Json<MoltbookPostRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.title.trim().is_empty() || body.content.trim().is_empty() {
        return Err(ApiError::bad_request("title and content are required"));
    }
    let (post_id, post_url) = state
        .runtime
        .moltbook
        .create_post(&body.title, &body.content, body.submolt.as_deref())
        .await
        .map_err(|err| ApiError::Upstream(err.to_string()))?;
    Ok(Json(json!({ "post_id": post_id, "post_url": post_url })))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_max_results() -> usize {
    5
}

fn default_source() -> String {
    "api".to_string()
}

pub async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    let results = state
        .runtime
        .search
        .search(&body.query, body.max_results.min(10), &body.source)
        .await;
    Ok(Json(json!({ "results": results })))
}

pub async fn search_history(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({ "history": state.runtime.search.history(50)? })))
}
