//! Error taxonomy for the messaging and dispatch core.
//!
//! Each failure class gets its own enum so callers can decide whether the
//! failure is fatal (connection, topology, setup) or scoped to a single
//! request or message (publish, dispatch, forward).

use thiserror::Error;

use crate::queue::topic::TopicError;

/// A dependency could not be reached within its retry policy.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("{dependency} unreachable after {attempts} attempts: {last_error}")]
    Exhausted {
        dependency: String,
        attempts: u32,
        last_error: String,
    },
}

/// Exchange, queue or binding declaration failed.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to open channel: {0}")]
    Channel(#[from] lapin::Error),

    #[error("failed to declare exchange {exchange}: {source}")]
    Exchange {
        exchange: String,
        #[source]
        source: lapin::Error,
    },

    #[error("failed to declare queue: {0}")]
    Queue(#[source] lapin::Error),

    #[error("failed to bind queue {queue} to {pattern}: {source}")]
    Bind {
        queue: String,
        pattern: String,
        #[source]
        source: lapin::Error,
    },
}

/// A single publish could not be completed.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to open channel: {0}")]
    Channel(#[from] lapin::Error),

    #[error("emitter setup failed: {0}")]
    Topology(#[from] TopologyError),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid routing key {routing_key:?}: {reason}")]
    InvalidRoutingKey {
        routing_key: String,
        reason: TopicError,
    },

    #[error("failed to publish with routing key {routing_key}: {source}")]
    Publish {
        routing_key: String,
        #[source]
        source: lapin::Error,
    },
}

/// The consumer could not start listening.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no topics to bind")]
    NoTopics,

    #[error("invalid topic pattern {pattern:?}: {reason}")]
    InvalidTopic { pattern: String, reason: TopicError },

    #[error("failed to open channel: {0}")]
    Channel(#[from] lapin::Error),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("failed to start consuming: {0}")]
    Consume(#[source] lapin::Error),
}

/// Forwarding a consumed event to the logging collaborator failed.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("logging collaborator unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("logging collaborator answered {0}")]
    Status(u16),
}

impl ForwardError {
    /// Whether retrying the same event could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ForwardError::Transport(_) => true,
            ForwardError::Status(code) => *code >= 500,
        }
    }
}

/// Client-visible failure of an inbound submission.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Upstream(String),

    #[error(transparent)]
    Publish(#[from] PublishError),
}
