//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The server exists so LLM provider keys stay off client devices. It exposes
//! one API route, `POST /api/analyze`, plus a health probe.

pub mod analyze;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the API router. `body_limit` caps request bodies in bytes; photo
/// data URLs routinely exceed axum's 2 MB default.
pub fn app(state: AppState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/analyze", post(analyze::analyze))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
