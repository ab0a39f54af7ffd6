//! Personality surfaces: the trait vector, its history, reset, and the
//! manual force-evolve hook.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{ApiError, AppState};

pub async fn current(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let traits = state.runtime.store.trait_rows()?;
    let config = state.runtime.config.read().expect("config lock");
    Ok(Json(json!({
        "traits": traits,
        "ai_name": config.ai.ai_name,
        "version": config.ai.ai_version,
    })))
}

pub async fn history(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let history = state.runtime.store.personality_history(100)?;
    Ok(Json(json!({ "history": history })))
}

pub async fn reset(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let changes = state.runtime.personality.reset()?;
    Ok(Json(json!({
        "status": "reset",
        "changes": changes,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ForceEvolveRequest {
    pub message: String,
    #[serde(default)]
    pub response: String,
}

/// Apply one synthetic exchange to the trait vector. Gated on the manual
/// evolution toggle so the UI switch actually means something.
pub async fn force_evolve(
    State(state): State<AppState>,
    Json(body): Json<ForceEvolveRequest>,
) -> Result<Json<Value>, ApiError> {
    let allowed = state
        .runtime
        .config
        .read()
        .expect("config lock")
        .personality
        .manual_evolution_enabled;
    if !allowed {
        return Err(ApiError::conflict("manual evolution is disabled"));
    }
    if body.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }

    let changes = state.runtime.personality.evolve(
        &body.message,
        &body.response,
        state.runtime.conversation_count(),
    )?;
    Ok(Json(json!({ "changes": changes })))
}
