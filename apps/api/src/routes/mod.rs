pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::guardrails::handlers as guardrail_handlers;
use crate::sessions::handlers as session_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_handler))
        // Session API
        .route(
            "/api/v1/sessions",
            post(session_handlers::handle_create_session),
        )
        .route(
            "/api/v1/sessions/:id",
            get(session_handlers::handle_get_session),
        )
        .route(
            "/api/v1/sessions/:id/documents/:document_id",
            get(session_handlers::handle_download_document),
        )
        // Guardrail API
        .route(
            "/api/v1/guardrails",
            get(guardrail_handlers::handle_list_guardrails),
        )
        .route(
            "/api/v1/guardrails/validate",
            post(guardrail_handlers::handle_validate),
        )
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}
