//! Switchboard - topic fan-out over RabbitMQ with an action-based dispatcher.
//!
//! This library provides shared modules for the two Switchboard binaries:
//! - `switchboard-broker`: HTTP front door routing `auth`, `log` and `mail`
//!   submissions to their collaborators
//! - `switchboard-listener`: Consumer bound to the `logs_topic` exchange,
//!   forwarding events to the logging collaborator
//!
//! ## Architecture
//!
//! ```text
//! POST /handle → Dispatcher ─┬─ auth → authentication-service
//!                            ├─ mail → mail-service
//!                            └─ log  → logs_topic (log.INFO) → Listener → logger-service
//! ```

pub mod backoff;
pub mod collaborators;
pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod processor;
pub mod queue;
pub mod shutdown;
pub mod web;

// Re-export commonly used types
pub use backoff::{connect_broker, connect_with_backoff, RetryPolicy};
pub use collaborators::{http_client, Collaborator, Collaborators};
pub use config::Config;
pub use consumer::{AckMode, Consumer, ConsumerOptions, HandlerPool};
pub use dispatch::{Dispatcher, JsonResponse, RequestPayload};
pub use processor::{EventHandler, LogForwarder};
pub use queue::{AmqpLogPublisher, Emitter, LogEvent, LogPublisher, EXCHANGE_NAME};
pub use shutdown::shutdown_signal;
pub use web::AppState;
