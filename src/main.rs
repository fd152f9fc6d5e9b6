//! fleetwatch server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - FLEETWATCH_HOST: Bind address (default: 0.0.0.0)
//! - FLEETWATCH_PORT: Port number (default: 8080)
//! - FLEETWATCH_DISPATCH_WORKERS: Concurrent email senders (default: 4)
//! - FLEETWATCH_DISPATCH_QUEUE: Pending email slots (default: 256)
//! - SMTP_HOST, SMTP_PORT, SMTP_USER, SMTP_PASS: Mail submission (all required to enable email)
//! - SMTP_FROM: Sender address (default: SMTP_USER)
//! - SMTP_TIMEOUT_SECS: SMTP timeout (default: 10)
//! - RUST_LOG: Log level (default: info)

use fleetwatch::api::run_server;
use fleetwatch::ServerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetwatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    tracing::info!("fleetwatch configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!(
        "  Dispatch: {} workers, queue of {}",
        config.dispatch.workers,
        config.dispatch.queue_capacity
    );
    match &config.smtp {
        Some(smtp) => tracing::info!(
            "  SMTP: {}:{} as {}",
            smtp.host,
            smtp.port,
            smtp.from.as_deref().unwrap_or(&smtp.username)
        ),
        None => tracing::info!("  SMTP: DISABLED (alerts are logged only)"),
    }

    run_server(config).await
}
