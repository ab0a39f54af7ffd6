//! Read surfaces for the cognitive engines, plus the manual consolidation
//! trigger.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::{ApiError, AppState};

pub async fn journal(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let entries = state.runtime.journal.recent_entries(30)?;
    Ok(Json(json!({ "entries": entries })))
}

pub async fn goals(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let goals = state.runtime.goals.active_goals()?;
    Ok(Json(json!({ "goals": goals })))
}

pub async fn interests(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let interests = state.runtime.interests.top_interests(25)?;
    Ok(Json(json!({ "interests": interests })))
}

pub async fn curiosity(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let items = state.runtime.store.recent_curiosity(50)?;
    let counts = state.runtime.store.curiosity_counts()?;
    Ok(Json(json!({ "items": items, "counts": counts })))
}

pub async fn self_awareness(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let current = state.runtime.awareness.current_level()?;
    let trend = state.runtime.awareness.trend(30, 20)?;
    Ok(Json(json!({ "current": current, "trend": trend })))
}

pub async fn run_consolidation(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.runtime.run_night_consolidation().await? {
        Some(run) => Ok(Json(json!({ "status": "completed", "run": run }))),
        None => Ok(Json(json!({
            "status": "skipped",
            "reason": "already ran today",
        }))),
    }
}
