use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    create_topology, debug_logs, delete_topology, engine_stats, get_topology, health_check,
    list_topologies, recent_alerts, store_metric, topology_rules, update_topology, AppState,
};
use crate::alerts::{LogMailer, Mailer, SmtpMailer};
use crate::config::ServerConfig;
use crate::engine::AlertEngine;
use crate::ingest::{LogSink, MetricIngest};
use crate::topology::{MemoryTopologyRepository, TopologyService};

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        .route("/stats", get(engine_stats))
        // Agent samples
        .route("/metrics", post(store_metric))
        // Topologies
        .route("/topologies", get(list_topologies).post(create_topology))
        .route("/topologies/debug/logs", get(debug_logs))
        .route(
            "/topologies/:id",
            get(get_topology)
                .put(update_topology)
                .delete(delete_topology),
        )
        .route("/topologies/:id/rules", get(topology_rules))
        // Alerts
        .route("/alerts/recent", get(recent_alerts))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Email delivery
    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            let mailer = Arc::new(SmtpMailer::new(smtp)?);
            let startup = Arc::clone(&mailer);
            tokio::spawn(async move { startup.verify_or_warn().await });
            mailer as Arc<dyn Mailer>
        }
        None => {
            tracing::warn!("SMTP not configured, alert emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let engine = Arc::new(
        AlertEngine::builder()
            .mailer(mailer)
            .dispatch(config.dispatch)
            .build(),
    );

    let topologies = TopologyService::new(
        Arc::new(MemoryTopologyRepository::new()),
        Arc::clone(&engine),
    );
    topologies.load_rules().await?;

    let state = Arc::new(AppState {
        engine: Arc::clone(&engine),
        topologies,
        ingest: MetricIngest::new(Arc::clone(&engine), Arc::new(LogSink)),
    });

    // Build router
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting fleetwatch server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush queued notifications
    engine.shutdown().await;

    tracing::info!("fleetwatch server stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");

    tracing::info!("Shutdown signal received, draining alert dispatch...");
}
