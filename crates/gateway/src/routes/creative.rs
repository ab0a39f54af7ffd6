//! Creative workshop and image endpoints.

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::Response;
use serde::Deserialize;
use serde_json::{Value, json};

use nexira_actions::execute_code;

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub mode: String,
    #[serde(default)]
    pub language: Option<String>,
}

const MODES: &[&str] = &["code", "story", "poem", "essay", "letter"];

pub async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<Value>, ApiError> {
    if !MODES.contains(&body.mode.as_str()) {
        return Err(ApiError::bad_request("unknown creative mode"));
    }
    if body.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }

    let language = body.language.as_deref().unwrap_or("python");
    let instruction = match body.mode.as_str() {
        "code" => format!(
            "Write {language} code for the following request. Output one fenced code block and a short explanation.\n\nRequest: {}",
            body.prompt
        ),
        mode => format!(
            "Write a {mode} for the following request. Output only the {mode} itself.\n\nRequest: {}",
            body.prompt
        ),
    };

    let content = state
        .runtime
        .gate
        .generate(&instruction, None)
        .await
        .map_err(|err| ApiError::Upstream(err.to_string()))?;

    let title: String = body.prompt.chars().take(60).collect();
    let id = state.runtime.store.insert_creative_output(
        &body.mode,
        &title,
        &content,
        if body.mode == "code" { language } else { "" },
        &body.prompt,
    )?;

    Ok(Json(json!({ "id": id, "content": content, "mode": body.mode })))
}

#[derive(Debug, Deserialize)]
pub struct RefineRequest {
    pub id: i64,
    pub instructions: String,
}

pub async fn refine(
    State(state): State<AppState>,
    Json(body): Json<RefineRequest>,
) -> Result<Json<Value>, ApiError> {
    let Some(output) = state.runtime.store.creative_output(body.id)? else {
        return Err(ApiError::not_found("creative output not found"));
    };
    if body.instructions.trim().is_empty() {
        return Err(ApiError::bad_request("instructions must not be empty"));
    }

    let prompt = format!(
        "Here is a previous {} you wrote:\n\n{}\n\nRevise it according to these instructions: {}\n\nOutput only the revised version.",
        output.output_type,
        output.content.unwrap_or_default(),
        body.instructions,
    );
    let content = state
        .runtime
        .gate
        .generate(&prompt, None)
        .await
        .map_err(|err| ApiError::Upstream(err.to_string()))?;

    let id = state.runtime.store.insert_creative_output(
        &output.output_type,
        &format!("{} (refined)", output.title),
        &content,
        output.language.as_deref().unwrap_or(""),
        &body.instructions,
    )?;
    Ok(Json(json!({ "id": id, "content": content })))
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub id: i64,
}

pub async fn execute(
    State(state): State<AppState>,
    Json(body): Json<ExecuteRequest>,
) -> Result<Json<Value>, ApiError> {
    let Some(output) = state.runtime.store.creative_output(body.id)? else {
        return Err(ApiError::not_found("creative output not found"));
    };
    let language = output.language.unwrap_or_default();
    let code = output.content.unwrap_or_default();
    if code.is_empty() {
        return Err(ApiError::bad_request("output has no content to run"));
    }

    let outcome = execute_code(&code, &language).await;
    state
        .runtime
        .store
        .set_creative_run_result(body.id, outcome.success, &outcome.output)?;
    Ok(Json(json!({
        "success": outcome.success,
        "output": outcome.output,
    })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub output_type: Option<String>,
}

pub async fn history(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let outputs = state
        .runtime
        .store
        .creative_history(30, query.output_type.as_deref())?;
    Ok(Json(json!({ "outputs": outputs })))
}

pub async fn images(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({ "images": state.runtime.images.list_images(30) })))
}

#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub guidance: Option<f64>,
}

pub async fn generate_image(
    State(state): State<AppState>,
    Json(body): Json<ImageRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }
    let path = state
        .runtime
        .images
        .generate_image(
            &body.prompt,
            body.negative_prompt.as_deref(),
            body.steps,
            body.guidance,
        )
        .await
        .map_err(|err| ApiError::Upstream(err.to_string()))?;
    state
        .runtime
        .store
        .log_activity("image", "generated via api", &body.prompt, Some(&path))?;
    Ok(Json(json!({ "path": path })))
}

pub async fn image_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let Some(absolute) = state.runtime.images.resolve_image_path(&path) else {
        return Err(ApiError::not_found("image not found"));
    };
    let bytes = tokio::fs::read(&absolute).await?;
    Ok(Response::builder()
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from(bytes))
        .expect("static response"))
}
