//! Config read/patch and the email endpoints. The SMTP password is
//! encrypted on its way into the config file and never echoed back.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{ApiError, AppState};

pub async fn get_config(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mut value = {
        let config = state.runtime.config.read().expect("config lock");
        serde_json::to_value(&*config)?
    };
    // Never hand secrets back to the UI.
    if let Some(email) = value.get_mut("email") {
        if let Some(password) = email.get_mut("password") {
            *password = json!(if password.as_str().unwrap_or("").is_empty() {
                ""
            } else {
                "********"
            });
        }
    }
    Ok(Json(value))
}

pub async fn update_config(
    State(state): State<AppState>,
    Json(patch): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if !patch.is_object() {
        return Err(ApiError::bad_request("config patch must be an object"));
    }
    {
        let mut config = state.runtime.config.write().expect("config lock");
        config
            .apply_patch(&patch)
            .map_err(|err| ApiError::BadRequest(format!("invalid config patch: {err}")))?;
    }
    state.runtime.save_config()?;
    Ok(Json(json!({ "status": "saved" })))
}

#[derive(Debug, Deserialize)]
pub struct EmailConfigRequest {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub smtp_server: Option<String>,
    #[serde(default)]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub daily_enabled: Option<bool>,
    #[serde(default)]
    pub daily_send_time: Option<String>,
    #[serde(default)]
    pub daily_recipient: Option<String>,
}

pub async fn email_config(
    State(state): State<AppState>,
    Json(body): Json<EmailConfigRequest>,
) -> Result<Json<Value>, ApiError> {
    {
        let mut config = state.runtime.config.write().expect("config lock");
        if let Some(enabled) = body.enabled {
            config.email.enabled = enabled;
        }
        if let Some(server) = body.smtp_server {
            config.email.smtp_server = server;
        }
        if let Some(port) = body.smtp_port {
            config.email.smtp_port = port;
        }
        if let Some(username) = body.username {
            config.email.username = username;
        }
        if let Some(password) = body.password {
            // At rest, only ciphertext (or plaintext in degraded mode).
            config.email.password = state.runtime.secret_box.encrypt(&password);
        }
        if let Some(from_address) = body.from_address {
            config.email.from_address = from_address;
        }
        if let Some(enabled) = body.daily_enabled {
            config.daily_email.enabled = enabled;
        }
        if let Some(send_time) = body.daily_send_time {
            config.daily_email.send_time = send_time;
        }
        if let Some(recipient) = body.daily_recipient {
            config.daily_email.recipient = recipient;
        }
    }
    state.runtime.save_config()?;
    Ok(Json(json!({ "status": "saved" })))
}

pub async fn email_test(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .runtime
        .email
        .send_test_email(state.runtime.ai_name().as_deref())
        .await
        .map_err(|err| ApiError::Upstream(err.to_string()))?;
    Ok(Json(json!({ "status": "sent" })))
}

pub async fn email_send_summary(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .runtime
        .email
        .send_daily_summary(state.runtime.ai_name().as_deref())
        .await
        .map_err(|err| ApiError::Upstream(err.to_string()))?;
    Ok(Json(json!({ "status": "sent" })))
}

pub async fn email_log(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({ "log": state.runtime.email.log(50)? })))
}

pub async fn email_preview(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let (subject, body) = state
        .runtime
        .email
        .compose_daily_summary(state.runtime.ai_name().as_deref())?;
    Ok(Json(json!({ "subject": subject, "body": body })))
}
