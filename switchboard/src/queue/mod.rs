//! Queue module for RabbitMQ operations.
//!
//! This module provides:
//! - Wire types for the `logs_topic` topic exchange
//! - Topic routing rules and pattern validation
//! - Idempotent topology declarations and scoped channels
//! - The event emitter used by the dispatcher
//!
//! ## Architecture
//!
//! ```text
//! Dispatcher → Emitter → logs_topic ─┬─ log.*  → listener queue A → Consumer
//!                                    └─ #      → listener queue B → Consumer
//! ```

pub mod emitter;
pub mod topic;
pub mod topology;
pub mod types;

pub use emitter::{AmqpLogPublisher, Emitter, LogPublisher};
pub use topology::{
    bind_topics, declare_exchange, declare_exchange_with, declare_queue, with_channel,
    ExchangeSpec,
};
pub use types::{EventKind, LogEvent, EXCHANGE_NAME, LOG_INFO_ROUTING_KEY};
