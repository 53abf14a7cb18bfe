//! Switchboard Listener - RabbitMQ consumer for the `logs_topic` exchange.
//!
//! Binds a private queue to the configured topic patterns and forwards
//! every event to the logging collaborator.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use switchboard::{
    connect_broker, http_client, shutdown_signal, Collaborators, Config, Consumer, LogForwarder,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("listener_starting");

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        topics = ?config.listener_topics,
        ack_mode = ?config.ack_mode,
        concurrency = config.handler_concurrency,
        logger_service_url = %config.logger_service_url,
        "config_loaded"
    );

    let connection = connect_broker(&config.amqp_url, &config.broker_retry_policy())
        .await
        .context("Failed to connect to RabbitMQ")?;
    let connection = Arc::new(connection);

    let http = http_client().context("Failed to create HTTP client")?;
    let collaborators =
        Collaborators::from_config(&config, http).context("Invalid collaborator URL")?;
    let forwarder = Arc::new(LogForwarder::new(collaborators.logger));

    let consumer = Consumer::new(Arc::clone(&connection), config.consumer_options())
        .await
        .context("Failed to set up consumer")?;

    info!("listener_ready");

    consumer
        .listen(&config.listener_topics, forwarder, shutdown_signal())
        .await
        .context("Failed to start listening")?;

    if let Err(e) = connection.close(200, "Normal shutdown").await {
        warn!(error = %e, "rabbitmq_connection_close_error");
    }

    info!("listener_shutdown_complete");
    Ok(())
}
