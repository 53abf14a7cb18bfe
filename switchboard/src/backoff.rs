//! Connection establishment with backoff.
//!
//! Every external dependency gets an explicit [`RetryPolicy`]. The broker
//! gives up after a bounded number of failures so startup can abort; the
//! database keeps trying forever and only escalates its logging once the
//! warning threshold is crossed.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use lapin::{Connection, ConnectionProperties};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::ConnectionError;

/// How long to wait after the n-th consecutive failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    /// Same delay after every failure.
    Fixed(Duration),
    /// `failures² × unit`.
    Quadratic { unit: Duration },
}

impl Delay {
    pub fn after_failures(&self, failures: u32) -> Duration {
        match *self {
            Delay::Fixed(delay) => delay,
            Delay::Quadratic { unit } => unit.saturating_mul(failures.saturating_mul(failures)),
        }
    }
}

/// When to stop retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptLimit {
    /// Fail once the failure counter exceeds `max_failures`.
    Bounded { max_failures: u32 },
    /// Never fail. Failures past `warn_after` are logged at error level.
    Unbounded { warn_after: u32 },
}

/// Per-dependency retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Delay,
    pub limit: AttemptLimit,
}

impl RetryPolicy {
    /// Quadratic backoff in seconds, giving up after the 6th failure.
    pub fn broker() -> Self {
        Self {
            delay: Delay::Quadratic {
                unit: Duration::from_secs(1),
            },
            limit: AttemptLimit::Bounded { max_failures: 5 },
        }
    }

    /// Fixed two-second backoff that never gives up.
    pub fn database() -> Self {
        Self {
            delay: Delay::Fixed(Duration::from_secs(2)),
            limit: AttemptLimit::Unbounded { warn_after: 10 },
        }
    }

    /// Replace the limit with a bounded one.
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.limit = AttemptLimit::Bounded { max_failures };
        self
    }
}

/// Run `attempt` until it succeeds or `policy` gives up.
///
/// Only the calling task sleeps between attempts.
pub async fn connect_with_backoff<T, E, F, Fut>(
    dependency: &str,
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<T, ConnectionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut failures: u32 = 0;

    loop {
        info!(dependency, attempt = failures + 1, "dependency_connecting");

        let err = match attempt().await {
            Ok(connection) => {
                info!(dependency, failures, "dependency_connected");
                return Ok(connection);
            }
            Err(err) => err,
        };

        failures = failures.saturating_add(1);
        warn!(dependency, failures, error = %err, "dependency_not_ready");

        match policy.limit {
            AttemptLimit::Bounded { max_failures } if failures > max_failures => {
                error!(dependency, failures, error = %err, "dependency_connect_exhausted");
                return Err(ConnectionError::Exhausted {
                    dependency: dependency.to_string(),
                    attempts: failures,
                    last_error: err.to_string(),
                });
            }
            AttemptLimit::Unbounded { warn_after } if failures > warn_after => {
                error!(dependency, failures, error = %err, "dependency_still_unreachable");
            }
            _ => {}
        }

        let delay = policy.delay.after_failures(failures);
        info!(
            dependency,
            delay_ms = delay.as_millis() as u64,
            "dependency_backing_off"
        );
        sleep(delay).await;
    }
}

/// Connect to RabbitMQ under `policy`.
pub async fn connect_broker(url: &str, policy: &RetryPolicy) -> Result<Connection, ConnectionError> {
    info!(url_length = url.len(), "rabbitmq_connecting");
    connect_with_backoff("rabbitmq", policy, || {
        Connection::connect(url, ConnectionProperties::default())
    })
    .await
}
