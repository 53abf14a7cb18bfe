//! Action-based request dispatcher.
//!
//! An inbound submission names one action and carries the matching payload.
//! Each action maps to exactly one downstream strategy:
//!
//! ```text
//! auth → POST authentication-service/authenticate   (synchronous)
//! log  → publish on logs_topic with key log.INFO    (asynchronous)
//! mail → POST mail-service/send                     (synchronous)
//! ```
//!
//! Every downstream call is attempted once.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::collaborators::Collaborator;
use crate::error::DispatchError;
use crate::queue::{LogEvent, LogPublisher, LOG_INFO_ROUTING_KEY};

/// Response envelope shared with the collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonResponse {
    pub error: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonResponse {
    pub fn success(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            error: false,
            message: message.into(),
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPayload {
    pub name: String,
    pub data: String,
}

impl From<LogPayload> for LogEvent {
    fn from(payload: LogPayload) -> Self {
        LogEvent::new(payload.name, payload.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailPayload {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub message: String,
}

/// Inbound submission, tagged by `action`.
///
/// The payload lives in the sibling field named after the action:
/// `{"action": "mail", "mail": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RequestPayload {
    Auth { auth: AuthPayload },
    Log { log: LogPayload },
    Mail { mail: MailPayload },
}

const ACTIONS: [&str; 3] = ["auth", "log", "mail"];

impl RequestPayload {
    pub fn action(&self) -> &'static str {
        match self {
            RequestPayload::Auth { .. } => "auth",
            RequestPayload::Log { .. } => "log",
            RequestPayload::Mail { .. } => "mail",
        }
    }

    /// Decode a request body.
    ///
    /// A missing or unknown `action` is reported as "unknown action" before
    /// the payload itself is looked at.
    pub fn from_slice(body: &[u8]) -> Result<Self, DispatchError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| DispatchError::BadRequest(format!("invalid request body: {}", e)))?;

        let requested = value.get("action").and_then(Value::as_str).unwrap_or("");
        let action = match ACTIONS.iter().copied().find(|a| *a == requested) {
            Some(action) => action,
            None => return Err(DispatchError::BadRequest("unknown action".to_string())),
        };

        serde_json::from_value(value)
            .map_err(|e| DispatchError::BadRequest(format!("invalid {} payload: {}", action, e)))
    }
}

/// Routes submissions to the collaborators.
pub struct Dispatcher {
    auth: Collaborator,
    mail: Collaborator,
    logs: Arc<dyn LogPublisher>,
}

impl Dispatcher {
    pub fn new(auth: Collaborator, mail: Collaborator, logs: Arc<dyn LogPublisher>) -> Self {
        Self { auth, mail, logs }
    }

    /// Run the strategy for `payload`'s action.
    pub async fn handle_submission(
        &self,
        payload: RequestPayload,
    ) -> Result<JsonResponse, DispatchError> {
        info!(action = payload.action(), "dispatch_started");

        match payload {
            RequestPayload::Auth { auth } => self.authenticate(auth).await,
            RequestPayload::Log { log } => self.log_via_queue(log).await,
            RequestPayload::Mail { mail } => self.send_mail(mail).await,
        }
    }

    async fn authenticate(&self, auth: AuthPayload) -> Result<JsonResponse, DispatchError> {
        let response = self.auth.post(&auth).await.map_err(|e| {
            DispatchError::Upstream(format!("error calling auth service: {}", e))
        })?;

        match response.status() {
            StatusCode::ACCEPTED => {}
            StatusCode::UNAUTHORIZED => {
                warn!(reason = "status", "dispatch_auth_rejected");
                return Err(DispatchError::Unauthorized("invalid credentials".to_string()));
            }
            status => {
                error!(status_code = status.as_u16(), "dispatch_auth_upstream_status");
                return Err(DispatchError::Upstream(
                    "error calling auth service".to_string(),
                ));
            }
        }

        let envelope: JsonResponse = response.json().await.map_err(|e| {
            DispatchError::Upstream(format!("invalid auth service response: {}", e))
        })?;

        if envelope.error {
            warn!(reason = "envelope", "dispatch_auth_rejected");
            return Err(DispatchError::Unauthorized(envelope.message));
        }

        info!("dispatch_auth_accepted");
        Ok(JsonResponse::success("authenticated!", envelope.data))
    }

    async fn log_via_queue(&self, log: LogPayload) -> Result<JsonResponse, DispatchError> {
        let name = log.name.clone();
        let event = LogEvent::from(log);

        self.logs
            .publish(&event, LOG_INFO_ROUTING_KEY)
            .await
            .map_err(|e| {
                error!(name = %name, error = %e, "dispatch_log_publish_failed");
                DispatchError::from(e)
            })?;

        info!(name = %name, routing_key = LOG_INFO_ROUTING_KEY, "dispatch_log_enqueued");
        Ok(JsonResponse::success(
            format!("pushed log {} to rabbitmq", name),
            None,
        ))
    }

    async fn send_mail(&self, mail: MailPayload) -> Result<JsonResponse, DispatchError> {
        let response = self.mail.post(&mail).await.map_err(|e| {
            DispatchError::Upstream(format!("error calling mail service: {}", e))
        })?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            error!(status_code = status.as_u16(), to = %mail.to, "dispatch_mail_upstream_status");
            return Err(DispatchError::Upstream(
                "error calling mail service".to_string(),
            ));
        }

        info!(to = %mail.to, "dispatch_mail_sent");
        Ok(JsonResponse::success(
            format!("message sent to {}", mail.to),
            None,
        ))
    }
}
