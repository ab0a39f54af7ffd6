//! HTTP+WebSocket gateway: the JSON API the single-user web UI consumes.
//! Thin by design — handlers validate, call into the runtime, and map
//! errors onto `{error}` JSON bodies.

mod error;
mod routes;
mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use nexira_cognition::ThreadingEngine;
use nexira_runtime::Runtime;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<Runtime>,
    pub threads: Arc<ThreadingEngine>,
}

impl AppState {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        let threads = Arc::new(ThreadingEngine::new(runtime.store.clone()));
        Self { runtime, threads }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Chat
        .route("/api/chat", post(routes::chat::chat))
        .route("/api/chat/history", get(routes::chat::history))
        .route("/api/feedback", post(routes::chat::feedback))
        .route("/api/upload", post(routes::chat::upload))
        // Personality
        .route("/api/personality", get(routes::personality::current))
        .route("/api/personality/history", get(routes::personality::history))
        .route("/api/personality/reset", post(routes::personality::reset))
        .route(
            "/api/personality/force-evolve",
            post(routes::personality::force_evolve),
        )
        // Cognition surfaces
        .route("/api/journal", get(routes::cognition::journal))
        .route("/api/goals", get(routes::cognition::goals))
        .route("/api/interests", get(routes::cognition::interests))
        .route("/api/curiosity", get(routes::cognition::curiosity))
        .route("/api/self-awareness", get(routes::cognition::self_awareness))
        .route("/api/consolidation/run", post(routes::cognition::run_consolidation))
        // Config + email
        .route(
            "/api/config",
            get(routes::config::get_config).post(routes::config::update_config),
        )
        .route("/api/email/config", post(routes::config::email_config))
        .route("/api/email/test", post(routes::config::email_test))
        .route("/api/email/send-summary", post(routes::config::email_send_summary))
        .route("/api/email/log", get(routes::config::email_log))
        .route("/api/email/preview", get(routes::config::email_preview))
        // Social + search
        .route("/api/moltbook/log", get(routes::social::moltbook_log))
        .route("/api/moltbook/feed", get(routes::social::moltbook_feed))
        .route("/api/moltbook/post", post(routes::social::moltbook_post))
        .route("/api/search", post(routes::social::search))
        .route("/api/search/history", get(routes::social::search_history))
        // Creative + images
        .route("/api/creative/generate", post(routes::creative::generate))
        .route("/api/creative/refine", post(routes::creative::refine))
        .route("/api/creative/execute", post(routes::creative::execute))
        .route("/api/creative/history", get(routes::creative::history))
        .route("/api/images", get(routes::creative::images))
        .route("/api/images/generate", post(routes::creative::generate_image))
        .route("/api/images/file/*path", get(routes::creative::image_file))
        // System
        .route("/api/stats", get(routes::system::stats))
        .route("/api/activity/log", get(routes::system::activity_log).post(routes::system::log_activity))
        .route("/api/threads", get(routes::system::threads))
        .route("/api/threads/:id", get(routes::system::thread_by_id))
        .route("/api/threads-rebuild", post(routes::system::rebuild_threads))
        .route("/api/backups", get(routes::system::backups))
        .route("/api/backups/run", post(routes::system::run_backup))
        .route("/api/backups/restore", post(routes::system::restore_backup))
        // WebSocket
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}
