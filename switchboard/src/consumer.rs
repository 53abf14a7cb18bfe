//! RabbitMQ consumer module using lapin.
//!
//! This module handles binding a private queue to the `logs_topic`
//! exchange, consuming deliveries, and spawning a bounded task per
//! delivery to classify and forward it.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions},
    types::FieldTable,
    Channel, Connection,
};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::error::{ForwardError, SetupError};
use crate::processor::{decode_event, handle_event, EventHandler, Outcome};
use crate::queue::topic::{matching, validate_pattern};
use crate::queue::{bind_topics, declare_exchange, declare_queue, with_channel, EXCHANGE_NAME};

/// When a delivery is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// Broker auto-ack on delivery. A crash mid-handling loses the message.
    #[default]
    AtMostOnce,
    /// Ack after a successful forward. Transient failures are requeued,
    /// anything else is dropped.
    AtLeastOnce,
}

impl FromStr for AckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "at-most-once" | "auto" => Ok(AckMode::AtMostOnce),
            "at-least-once" | "manual" => Ok(AckMode::AtLeastOnce),
            other => Err(format!("unknown ack mode: {}", other)),
        }
    }
}

/// Consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Fixed queue name; the broker picks one when `None`.
    pub queue_name: Option<String>,
    pub ack_mode: AckMode,
    /// Maximum number of handlers running at once.
    pub concurrency: usize,
    /// How long to wait for in-flight handlers on shutdown.
    pub drain_timeout: Duration,
    pub consumer_tag: String,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            queue_name: None,
            ack_mode: AckMode::AtMostOnce,
            concurrency: 100,
            drain_timeout: Duration::from_secs(30),
            consumer_tag: "switchboard-listener".to_string(),
        }
    }
}

/// Semaphore-gated task spawner.
///
/// `spawn` returns as soon as the task is started; it only waits when all
/// permits are taken.
pub struct HandlerPool {
    semaphore: Arc<Semaphore>,
    capacity: u32,
}

impl HandlerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = u32::try_from(capacity.max(1)).unwrap_or(u32::MAX);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Handlers currently running.
    pub fn in_flight(&self) -> usize {
        self.capacity as usize - self.semaphore.available_permits()
    }

    /// Spawn `task` once a permit is free.
    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!("listener_pool_closed");
                return;
            }
        };

        tokio::spawn(async move {
            task.await;
            drop(permit);
        });
    }

    /// Wait until every handler has finished. Returns `false` on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, self.semaphore.acquire_many(self.capacity)).await,
            Ok(Ok(_))
        )
    }
}

/// Long-lived subscriber on the `logs_topic` exchange.
pub struct Consumer {
    connection: Arc<Connection>,
    options: ConsumerOptions,
}

impl Consumer {
    /// Create a consumer, declaring the exchange first.
    pub async fn new(
        connection: Arc<Connection>,
        options: ConsumerOptions,
    ) -> Result<Self, SetupError> {
        with_channel(&connection, |channel| async move {
            declare_exchange(&channel).await
        })
        .await?;

        Ok(Self {
            connection,
            options,
        })
    }

    /// Bind to `topics` and dispatch deliveries to `handler` until
    /// `shutdown` resolves or the broker closes the subscription.
    ///
    /// Errors only if setup fails before the first delivery.
    pub async fn listen<H, S>(
        &self,
        topics: &[String],
        handler: Arc<H>,
        shutdown: S,
    ) -> Result<(), SetupError>
    where
        H: EventHandler + 'static,
        S: Future<Output = ()>,
    {
        let bindings = normalize_topics(topics)?;
        let ack_mode = self.options.ack_mode;

        let channel = self.connection.create_channel().await?;

        let (queue_name, mut deliveries) = match self.subscribe(&channel, &bindings).await {
            Ok(subscription) => subscription,
            Err(e) => {
                close_channel(&channel, "Setup failed").await;
                return Err(e);
            }
        };

        info!(
            exchange = EXCHANGE_NAME,
            queue = %queue_name,
            topics = ?bindings,
            ack_mode = ?ack_mode,
            concurrency = self.options.concurrency,
            "rabbitmq_consumer_started"
        );

        let pool = HandlerPool::new(self.options.concurrency);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("listener_stopping");
                    break;
                }
                delivery = deliveries.next() => {
                    match delivery {
                        Some(Ok(delivery)) => {
                            let routing_key = delivery.routing_key.to_string();
                            let matched: Vec<&str> = matching(&bindings, &routing_key).collect();

                            debug!(
                                routing_key = %routing_key,
                                delivery_tag = delivery.delivery_tag,
                                body_length = delivery.data.len(),
                                matched_bindings = ?matched,
                                in_flight = pool.in_flight(),
                                "rabbitmq_delivery_received"
                            );

                            let handler = Arc::clone(&handler);
                            pool.spawn(process_delivery(handler, delivery, ack_mode)).await;
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "rabbitmq_delivery_error");
                        }
                        None => {
                            warn!("rabbitmq_consumer_closed");
                            break;
                        }
                    }
                }
            }
        }

        info!(in_flight = pool.in_flight(), "listener_draining");
        if !pool.drain(self.options.drain_timeout).await {
            warn!(
                in_flight = pool.in_flight(),
                timeout_secs = self.options.drain_timeout.as_secs(),
                "listener_drain_timeout"
            );
        }

        close_channel(&channel, "Normal shutdown").await;

        info!("listener_shutdown_complete");
        Ok(())
    }

    /// Declare and bind the private queue, then start consuming from it.
    async fn subscribe(
        &self,
        channel: &Channel,
        bindings: &[String],
    ) -> Result<(String, lapin::Consumer), SetupError> {
        let ack_mode = self.options.ack_mode;

        if ack_mode == AckMode::AtLeastOnce {
            let prefetch_count = prefetch_count(self.options.concurrency);
            channel
                .basic_qos(prefetch_count, BasicQosOptions::default())
                .await
                .map_err(SetupError::Consume)?;
            info!(prefetch_count, "rabbitmq_qos_set");
        }

        let queue = declare_queue(channel, self.options.queue_name.as_deref()).await?;
        let queue_name = queue.name().to_string();
        bind_topics(channel, &queue_name, bindings).await?;

        let deliveries = channel
            .basic_consume(
                &queue_name,
                &self.options.consumer_tag,
                BasicConsumeOptions {
                    no_ack: ack_mode == AckMode::AtMostOnce,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(SetupError::Consume)?;

        Ok((queue_name, deliveries))
    }
}

async fn close_channel(channel: &Channel, reason: &str) {
    if channel.status().connected() {
        if let Err(e) = channel.close(200, reason).await {
            warn!(error = %e, "rabbitmq_channel_close_error");
        }
    }
}

/// Unacked deliveries the broker may push at once; zero would mean unlimited.
fn prefetch_count(concurrency: usize) -> u16 {
    u16::try_from(concurrency.max(1)).unwrap_or(u16::MAX)
}

/// How a manually acknowledged delivery is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settle {
    /// Auto-acked by the broker already.
    Nothing,
    Ack,
    Requeue,
    Discard,
}

fn settlement(ack_mode: AckMode, result: &Result<Outcome, ForwardError>) -> Settle {
    match (ack_mode, result) {
        (AckMode::AtMostOnce, _) => Settle::Nothing,
        (AckMode::AtLeastOnce, Ok(_)) => Settle::Ack,
        (AckMode::AtLeastOnce, Err(e)) if e.is_transient() => Settle::Requeue,
        (AckMode::AtLeastOnce, Err(_)) => Settle::Discard,
    }
}

/// Handle one delivery and settle it according to `ack_mode`.
async fn process_delivery<H>(handler: Arc<H>, delivery: Delivery, ack_mode: AckMode)
where
    H: EventHandler + ?Sized,
{
    let delivery_tag = delivery.delivery_tag;
    let event = decode_event(&delivery.data);
    let result = handle_event(handler.as_ref(), &event).await;

    if let Err(e) = &result {
        error!(
            name = %event.name,
            delivery_tag = delivery_tag,
            error = %e,
            "listener_forward_failed"
        );
    }

    let settled = match settlement(ack_mode, &result) {
        Settle::Nothing => return,
        Settle::Ack => delivery.acker.ack(BasicAckOptions::default()).await,
        Settle::Requeue => {
            delivery
                .acker
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await
        }
        Settle::Discard => {
            warn!(name = %event.name, delivery_tag = delivery_tag, "listener_delivery_discarded");
            delivery
                .acker
                .nack(BasicNackOptions {
                    requeue: false,
                    ..Default::default()
                })
                .await
        }
    };

    if let Err(e) = settled {
        error!(delivery_tag = delivery_tag, error = %e, "rabbitmq_settle_failed");
    }
}

/// Validate `topics` and drop duplicates, keeping the first occurrence.
fn normalize_topics(topics: &[String]) -> Result<Vec<String>, SetupError> {
    if topics.is_empty() {
        return Err(SetupError::NoTopics);
    }

    let mut bindings: Vec<String> = Vec::with_capacity(topics.len());
    for topic in topics {
        validate_pattern(topic).map_err(|reason| SetupError::InvalidTopic {
            pattern: topic.clone(),
            reason,
        })?;
        if !bindings.contains(topic) {
            bindings.push(topic.clone());
        }
    }

    Ok(bindings)
}
