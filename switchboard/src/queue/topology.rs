//! Exchange, queue and binding declarations.
//!
//! All declarations are idempotent: declaring the same exchange with the
//! same parameters from any number of processes converges on one exchange,
//! while a parameter mismatch is rejected by the broker.

use std::future::Future;

use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel, Connection, ExchangeKind, Queue,
};
use tracing::{debug, info, warn};

use super::types::EXCHANGE_NAME;
use crate::error::TopologyError;

/// Parameters of an exchange declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub name: String,
    pub durable: bool,
    pub auto_delete: bool,
}

impl ExchangeSpec {
    /// The shared `logs_topic` exchange: durable, never auto-deleted.
    pub fn logs() -> Self {
        Self {
            name: EXCHANGE_NAME.to_string(),
            durable: true,
            auto_delete: false,
        }
    }
}

/// Open a channel, run `op` on it, and close the channel on every exit path.
///
/// A close failure is logged and never masks the result of `op`.
pub async fn with_channel<T, E, F, Fut>(connection: &Connection, op: F) -> Result<T, E>
where
    F: FnOnce(Channel) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<lapin::Error>,
{
    let channel = connection.create_channel().await?;
    let channel_id = channel.id();
    debug!(channel_id, "rabbitmq_channel_opened");

    let result = op(channel.clone()).await;

    // A failed declaration makes the broker close the channel for us.
    if channel.status().connected() {
        if let Err(e) = channel.close(200, "Normal shutdown").await {
            warn!(channel_id, error = %e, "rabbitmq_channel_close_error");
        }
    }
    debug!(channel_id, "rabbitmq_channel_released");

    result
}

/// Declare the `logs_topic` topic exchange.
pub async fn declare_exchange(channel: &Channel) -> Result<(), TopologyError> {
    declare_exchange_with(channel, &ExchangeSpec::logs()).await
}

/// Declare a topic exchange with explicit parameters.
pub async fn declare_exchange_with(
    channel: &Channel,
    spec: &ExchangeSpec,
) -> Result<(), TopologyError> {
    channel
        .exchange_declare(
            &spec.name,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: spec.durable,
                auto_delete: spec.auto_delete,
                internal: false,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|source| TopologyError::Exchange {
            exchange: spec.name.clone(),
            source,
        })?;

    debug!(
        exchange = %spec.name,
        durable = spec.durable,
        "rabbitmq_exchange_declared"
    );

    Ok(())
}

/// Declare a private inbox: non-durable, exclusive, deleted on disconnect.
///
/// Without a `name` the broker assigns a unique one, so every consumer
/// receives its own copy of each matching message.
pub async fn declare_queue(channel: &Channel, name: Option<&str>) -> Result<Queue, TopologyError> {
    let queue = channel
        .queue_declare(
            name.unwrap_or(""),
            QueueDeclareOptions {
                durable: false,
                exclusive: true,
                auto_delete: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(TopologyError::Queue)?;

    info!(queue = %queue.name(), "rabbitmq_queue_declared");

    Ok(queue)
}

/// Bind `queue` to the exchange once per pattern.
pub async fn bind_topics(
    channel: &Channel,
    queue: &str,
    patterns: &[String],
) -> Result<(), TopologyError> {
    for pattern in patterns {
        channel
            .queue_bind(
                queue,
                EXCHANGE_NAME,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| TopologyError::Bind {
                queue: queue.to_string(),
                pattern: pattern.clone(),
                source,
            })?;

        info!(
            queue = queue,
            exchange = EXCHANGE_NAME,
            pattern = %pattern,
            "rabbitmq_queue_bound"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_exchange_spec() {
        let spec = ExchangeSpec::logs();
        assert_eq!(spec.name, "logs_topic");
        assert!(spec.durable);
        assert!(!spec.auto_delete);
    }
}
