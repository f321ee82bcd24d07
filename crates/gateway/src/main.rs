//! Gateway service entry point.
//!
//! Real-time fan-out of upstream bus records to WebSocket clients.

use anyhow::{Context, Result};
use auth::KeyStore;
use clap::Parser;
use gateway::session::DEFAULT_QUEUE_CAPACITY;
use gateway::{config, create_router, AppState, Flags, Hub, Ingest, IngestConfig, Settings};
use kafka_client::KafkaConsumer;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let flags = Flags::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(config::log_level()).unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    info!("Starting gateway");

    let settings = Settings::from_env(flags).context("invalid configuration")?;

    info!("Configuration:");
    info!("  listen address: {}", settings.listen_addr);
    info!("  kafka brokers:  {}", settings.kafka_brokers);
    info!("  exchange:       {}", settings.exchange);
    if settings.rbac.is_empty() {
        info!("  rbac:           (none; public topics open)");
    }

    // Start Prometheus metrics server
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config::METRICS_PORT))
        .install()
        .context("failed to start metrics exporter")?;
    info!("Metrics listening on port {}", config::METRICS_PORT);

    // Load the token verification key: inline PEM wins over the key file.
    let keys = match &settings.inline_public_key {
        Some(pem) => KeyStore::from_pem_str(pem),
        None => KeyStore::from_file(&settings.pub_key_path),
    }
    .context("loading public key failed")?;

    let hub = Arc::new(Hub::new(settings.rbac.clone()));

    // Each instance consumes the full stream under its own group.
    let group = kafka_client::consumer_group_name();
    let consumer = KafkaConsumer::connect(&settings.kafka_brokers, &group, &settings.exchange)
        .context("failed to create consumer")?;

    let (ingest_shutdown_tx, ingest_shutdown_rx) = mpsc::channel(1);
    let ingest = Ingest::new(hub.clone(), consumer, IngestConfig::default());
    let ingest_handle = tokio::spawn(ingest.run(ingest_shutdown_rx));

    let state = Arc::new(AppState {
        hub,
        keys,
        queue_capacity: DEFAULT_QUEUE_CAPACITY,
    });
    let app = create_router(state);

    let listener = TcpListener::bind(&settings.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.listen_addr))?;
    info!("Listening on {}", settings.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down ingest...");
    let _ = ingest_shutdown_tx.send(()).await;
    let _ = ingest_handle.await;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
