//! Event processing - classify consumed events and forward them.
//!
//! `log`, `event` and unrecognized names are forwarded to the logging
//! collaborator. `auth` is reserved and skipped.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{info, warn};

use crate::collaborators::Collaborator;
use crate::error::ForwardError;
use crate::queue::{EventKind, LogEvent};

/// What happened to a consumed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Forwarded,
    Skipped,
}

/// Downstream side of the consumer.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn forward_log(&self, event: &LogEvent) -> Result<(), ForwardError>;
}

/// Decode a delivery body.
///
/// Malformed bodies become an empty event instead of being rejected.
pub fn decode_event(body: &[u8]) -> LogEvent {
    match serde_json::from_slice(body) {
        Ok(event) => event,
        Err(e) => {
            warn!(
                error = %e,
                body_preview = %String::from_utf8_lossy(&body[..body.len().min(200)]),
                "listener_event_decode_failed"
            );
            LogEvent::default()
        }
    }
}

/// Route one event to `handler` according to its kind.
pub async fn handle_event<H>(handler: &H, event: &LogEvent) -> Result<Outcome, ForwardError>
where
    H: EventHandler + ?Sized,
{
    let kind = event.kind();
    info!(name = %event.name, kind = ?kind, "listener_event_received");

    match kind {
        EventKind::Log | EventKind::Unrecognized => {
            handler.forward_log(event).await?;
            Ok(Outcome::Forwarded)
        }
        EventKind::Auth => Ok(Outcome::Skipped),
    }
}

/// Forwards events to the logging collaborator (`POST /log`).
pub struct LogForwarder {
    logger: Collaborator,
}

impl LogForwarder {
    pub fn new(logger: Collaborator) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl EventHandler for LogForwarder {
    async fn forward_log(&self, event: &LogEvent) -> Result<(), ForwardError> {
        let response = self.logger.post(event).await?;
        let status = response.status();

        if status != StatusCode::ACCEPTED {
            return Err(ForwardError::Status(status.as_u16()));
        }

        info!(name = %event.name, "listener_event_forwarded");
        Ok(())
    }
}
