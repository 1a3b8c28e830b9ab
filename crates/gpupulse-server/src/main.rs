mod config;
mod protocol;
mod state;
mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gpupulse_collector::{CollectorConfig, SampleCollector, SnapshotBroadcaster};
use gpupulse_smi::{SmiClient, SmiReader};

use config::ServerConfig;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();

    let reader = Arc::new(SmiReader::new(SmiClient::new(
        &config.smi_binary,
        config.read_timeout,
    )));
    let driver_version = reader.driver_version().await;
    if let Some(version) = &driver_version {
        info!("driver version {}", version);
    }

    let broadcaster = Arc::new(SnapshotBroadcaster::new(config.channel_capacity));
    let collector = SampleCollector::discover(
        reader,
        Arc::clone(&broadcaster),
        CollectorConfig {
            poll_interval: config.poll_interval,
            read_timeout: config.read_timeout,
        },
    )
    .await
    .context("hardware interface init failed")?;

    let state = Arc::new(AppState::new(
        collector.devices().to_vec(),
        driver_version,
        config.poll_interval.as_millis() as u64,
        Arc::clone(&broadcaster),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let collector_task = tokio::spawn(collector.run(shutdown_rx));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .route("/api/devices", get(devices_handler))
        .route("/health", get(|| async { "OK" }))
        .layer(cors)
        .with_state(state);

    info!("Starting server on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the poll loop; the cycle in progress finishes first.
    let _ = shutdown_tx.send(true);
    let _ = collector_task.await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

async fn snapshot_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.latest() {
        Some(snapshot) => Json(&*snapshot).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "pending",
                "reason": "no snapshot captured yet",
            })),
        )
            .into_response(),
    }
}

async fn devices_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.inventory()).into_response()
}
