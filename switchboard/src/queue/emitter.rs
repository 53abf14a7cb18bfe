//! Event emitter for the `logs_topic` exchange.
//!
//! Each publish opens its own channel over the shared connection and closes
//! it afterwards. There is no batching, no publisher confirm and no retry:
//! a failure is returned to the caller as-is.

use std::sync::Arc;

use async_trait::async_trait;
use lapin::{options::BasicPublishOptions, BasicProperties, Connection};
use tracing::info;

use super::topic::validate_routing_key;
use super::topology::{declare_exchange, with_channel};
use super::types::{LogEvent, EXCHANGE_NAME};
use crate::error::{PublishError, TopologyError};

/// Publishes raw bodies onto the exchange.
pub struct Emitter {
    connection: Arc<Connection>,
}

impl Emitter {
    /// Create an emitter, declaring the exchange first.
    pub async fn new(connection: Arc<Connection>) -> Result<Self, TopologyError> {
        with_channel(&connection, |channel| async move {
            declare_exchange(&channel).await
        })
        .await?;

        Ok(Self { connection })
    }

    /// Publish `body` with `routing_key`.
    pub async fn push(&self, body: &[u8], routing_key: &str) -> Result<(), PublishError> {
        validate_routing_key(routing_key).map_err(|reason| PublishError::InvalidRoutingKey {
            routing_key: routing_key.to_string(),
            reason,
        })?;

        with_channel(&self.connection, |channel| async move {
            channel
                .basic_publish(
                    EXCHANGE_NAME,
                    routing_key,
                    BasicPublishOptions::default(),
                    body,
                    BasicProperties::default().with_content_type("application/json".into()),
                )
                .await
                .map_err(|source| PublishError::Publish {
                    routing_key: routing_key.to_string(),
                    source,
                })?;
            Ok::<_, PublishError>(())
        })
        .await?;

        info!(
            exchange = EXCHANGE_NAME,
            routing_key = routing_key,
            body_length = body.len(),
            "rabbitmq_event_published"
        );

        Ok(())
    }
}

/// Sink for log events submitted through the dispatcher.
#[async_trait]
pub trait LogPublisher: Send + Sync {
    async fn publish(&self, event: &LogEvent, routing_key: &str) -> Result<(), PublishError>;
}

/// [`LogPublisher`] backed by RabbitMQ.
///
/// Builds a fresh [`Emitter`] for every event, so the exchange is
/// re-declared before each publish.
#[derive(Clone)]
pub struct AmqpLogPublisher {
    connection: Arc<Connection>,
}

impl AmqpLogPublisher {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl LogPublisher for AmqpLogPublisher {
    async fn publish(&self, event: &LogEvent, routing_key: &str) -> Result<(), PublishError> {
        let emitter = Emitter::new(Arc::clone(&self.connection)).await?;
        let body = serde_json::to_vec(event)?;
        emitter.push(&body, routing_key).await
    }
}
