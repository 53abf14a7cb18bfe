//! Dispatch endpoint handlers.
//!
//! The handlers decode the body, hand it to the [`Dispatcher`], and render
//! the result as a `{error, message, data?}` envelope.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::dispatch::{Dispatcher, JsonResponse, RequestPayload};
use crate::error::DispatchError;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Liveness ping on `POST /`.
pub async fn broker() -> Json<JsonResponse> {
    Json(JsonResponse::success("Hit the shadow broker", None))
}

// =============================================================================
// Submission
// =============================================================================

/// Dispatch endpoint.
///
/// Success is always `202 Accepted`; failures map to the status of their
/// class (see [`DispatchError`]'s `IntoResponse`).
pub async fn handle_submission(State(state): State<AppState>, body: Bytes) -> Response {
    let payload = match RequestPayload::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => return e.into_response(),
    };

    let action = payload.action();
    info!(action = action, body_length = body.len(), "submission_received");

    match state.dispatcher.handle_submission(payload).await {
        Ok(response) => {
            info!(action = action, "submission_accepted");
            (StatusCode::ACCEPTED, Json(response)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DispatchError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DispatchError::Upstream(_) => StatusCode::BAD_GATEWAY,
            DispatchError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status_code = status.as_u16(), error = %self, "submission_failed");
        } else {
            warn!(status_code = status.as_u16(), error = %self, "submission_rejected");
        }

        (status, Json(JsonResponse::failure(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::tests::{Harness, RecordingPublisher};
    use crate::web::router;
    use serde_json::{json, Value};

    async fn serve(harness: Harness) -> (String, Harness) {
        let app = router(AppState {
            dispatcher: Arc::clone(&harness.dispatcher),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), harness)
    }

    async fn submit(base: &str, body: Value) -> (StatusCode, Value) {
        let response = reqwest::Client::new()
            .post(format!("{}/handle", base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            DispatchError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DispatchError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            DispatchError::Upstream("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_unknown_action_is_400_without_side_effects() {
        let (base, recorders) = serve(Harness::healthy().await).await;

        let (status, body) = submit(&base, json!({"action": "frobnicate"})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": true, "message": "unknown action"}));
        assert_eq!(recorders.calls(), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_log_submission_is_accepted() {
        let (base, recorders) = serve(Harness::healthy().await).await;

        let (status, body) = submit(
            &base,
            json!({"action": "log", "log": {"name": "event", "data": "x"}}),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["error"], json!(false));
        assert_eq!(body["message"], json!("pushed log event to rabbitmq"));
        assert_eq!(recorders.calls(), (0, 1, 0));
    }

    #[tokio::test]
    async fn test_auth_401_renders_401_envelope() {
        let harness = Harness::new(
            StatusCode::UNAUTHORIZED,
            json!({"error": true, "message": "invalid credentials"}),
            StatusCode::ACCEPTED,
            RecordingPublisher::default(),
        )
        .await;
        let (base, recorders) = serve(harness).await;

        let (status, body) = submit(
            &base,
            json!({"action": "auth", "auth": {"email": "a@b.c", "password": "wrong"}}),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"error": true, "message": "invalid credentials"}));
        assert_eq!(recorders.calls(), (1, 0, 0));
    }

    #[tokio::test]
    async fn test_mail_500_renders_bad_gateway() {
        let harness = Harness::new(
            StatusCode::ACCEPTED,
            json!({"error": false}),
            StatusCode::INTERNAL_SERVER_ERROR,
            RecordingPublisher::default(),
        )
        .await;
        let (base, _) = serve(harness).await;

        let (status, body) = submit(
            &base,
            json!({"action": "mail", "mail": {"from": "a@b.c", "to": "d@e.f", "subject": "s", "message": "m"}}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], json!(true));
    }

    #[tokio::test]
    async fn test_broker_down_renders_500_for_log() {
        let harness = Harness::new(
            StatusCode::ACCEPTED,
            json!({"error": false, "message": "ok"}),
            StatusCode::ACCEPTED,
            RecordingPublisher {
                unreachable: true,
                ..Default::default()
            },
        )
        .await;
        let (base, _) = serve(harness).await;

        let (status, body) = submit(
            &base,
            json!({"action": "log", "log": {"name": "event", "data": "x"}}),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], json!(true));
    }

    #[tokio::test]
    async fn test_ping_and_health() {
        let (base, _) = serve(Harness::healthy().await).await;
        let client = reqwest::Client::new();

        let ping: Value = client.post(&base).send().await.unwrap().json().await.unwrap();
        assert_eq!(ping, json!({"error": false, "message": "Hit the shadow broker"}));

        let health: Value = client
            .get(format!("{}/health", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health, json!({"status": "ok"}));
    }
}
