//! Web server module for the broker role.
//!
//! This module provides the HTTP front door that:
//! - Accepts `{action, auth?, log?, mail?}` submissions on `POST /handle`
//! - Proxies `auth` and `mail` synchronously to their collaborators
//! - Enqueues `log` onto the `logs_topic` exchange
//! - Answers a liveness ping on `POST /` and `GET /health`

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{broker, handle_submission, health, AppState, HealthResponse};

/// Build the broker router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(broker))
        .route("/health", get(health))
        .route("/handle", post(handle_submission))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
