//! gaze-gateway server entry point.
//!
//! Starts the Axum HTTP server with the WebSocket endpoint and plain
//! health/info routes, and wires ctrl-c into session shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use gaze_gateway::app_state::AppState;
use gaze_gateway::capture::{FrameSupply, SimulatedFrameSource};
use gaze_gateway::config::{GatewayConfig, TrackingMode};
use gaze_gateway::domain::ConnectionRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = GatewayConfig::from_env();

    // Initialize tracing; RUST_LOG overrides LOG_LEVEL.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    if config.log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        addr = %config.bind_addr(),
        max_connections = config.max_connections,
        mode = ?config.tracking_mode,
        "starting gaze-gateway"
    );

    // Build domain layer
    let registry = Arc::new(ConnectionRegistry::new(config.max_connections));
    let frames = build_frame_supply(&config);
    let shutdown = CancellationToken::new();

    // Build application state and router
    let state = AppState {
        registry,
        frames,
        config: Arc::new(config.clone()),
        shutdown: shutdown.clone(),
    };
    let app = gaze_gateway::build_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %config.bind_addr(), "server listening");
    tracing::info!("websocket endpoint: /ws, health check: /health");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        shutdown.cancel();
    })
    .await?;

    Ok(())
}

/// Constructs the process-level frame source per `TRACKING_MODE`.
///
/// Construction failure of the live pipeline does not abort startup: the
/// gateway still serves connections and reports the failure to clients
/// that request tracking.
fn build_frame_supply(config: &GatewayConfig) -> FrameSupply {
    match config.tracking_mode {
        TrackingMode::Simulated => {
            FrameSupply::ready(Arc::new(SimulatedFrameSource::new(config.simulated_interval)))
        }
        #[cfg(feature = "live-camera")]
        TrackingMode::Live => {
            match gaze_gateway::capture::live::LiveFrameSource::open(config.live_interval) {
                Ok(source) => FrameSupply::ready(Arc::new(source)),
                Err(err) => {
                    tracing::error!(error = %err, "live capture unavailable");
                    FrameSupply::unavailable(err.to_string())
                }
            }
        }
        #[cfg(not(feature = "live-camera"))]
        TrackingMode::Live => {
            tracing::error!("TRACKING_MODE=live but built without the live-camera feature");
            FrameSupply::unavailable("live capture support not compiled in")
        }
    }
}
