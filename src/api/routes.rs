use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let request_limit = state.config.upload.max_request_size as usize;

    Router::new()
        // Auth
        .route("/auth/login", post(handlers::login))
        .route("/auth/me", get(handlers::me))
        // Workspaces
        .route("/workspaces", get(handlers::list_workspaces))
        .route("/workspaces/:id/metadata", get(handlers::workspace_metadata))
        // Upload sessions
        .route("/upload/session", post(handlers::create_session))
        .route("/upload/sessions", get(handlers::list_sessions))
        .route(
            "/upload/:session_id/files",
            post(handlers::upload_files).layer(DefaultBodyLimit::max(request_limit)),
        )
        .route("/upload/:session_id/progress", get(handlers::get_progress))
        .route("/upload/:session_id/retry", post(handlers::retry_upload))
        .route("/upload/:session_id/cancel", post(handlers::cancel_upload))
        // Internal
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
