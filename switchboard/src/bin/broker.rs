//! Switchboard Broker - HTTP front door for `auth`, `log` and `mail` submissions.
//!
//! The broker refuses to start without RabbitMQ: once the connect policy
//! is exhausted the process exits with an error.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use switchboard::web::router;
use switchboard::{
    connect_broker, http_client, shutdown_signal, AmqpLogPublisher, AppState, Collaborators,
    Config, Dispatcher,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("broker_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        auth_service_url = %config.auth_service_url,
        mail_service_url = %config.mail_service_url,
        request_timeout_ms = config.request_timeout_ms,
        "config_loaded"
    );

    let connection = connect_broker(&config.amqp_url, &config.broker_retry_policy())
        .await
        .context("Failed to connect to RabbitMQ")?;
    let connection = Arc::new(connection);

    let http = http_client().context("Failed to create HTTP client")?;
    let collaborators =
        Collaborators::from_config(&config, http).context("Invalid collaborator URL")?;

    let publisher = AmqpLogPublisher::new(Arc::clone(&connection));
    let dispatcher = Dispatcher::new(collaborators.auth, collaborators.mail, Arc::new(publisher));

    let app = router(AppState::new(dispatcher));

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "broker_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("broker_shutting_down");
        })
        .await
        .context("Server error")?;

    if let Err(e) = connection.close(200, "Normal shutdown").await {
        warn!(error = %e, "rabbitmq_connection_close_error");
    }

    info!("broker_shutdown_complete");
    Ok(())
}
