//! System endpoints: health check and WebSocket connection info.

use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum::extract::State;
use chrono::Utc;
use serde::Serialize;

use crate::app_state::AppState;
use crate::error::GatewayError;

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    service: &'static str,
    version: &'static str,
    port: u16,
    environment: String,
    active_connections: usize,
}

/// `GET /health` — Service health status.
///
/// # Errors
///
/// Internal failures render as 500 `{"status":"unhealthy","error":...}`.
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, GatewayError> {
    let active_connections = state.registry.count().await;
    Ok((
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            timestamp: Utc::now().to_rfc3339(),
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            port: state.config.port,
            environment: state.config.environment.clone(),
            active_connections,
        }),
    ))
}

/// One supported WebSocket message description.
#[derive(Debug, Serialize)]
struct SupportedMessage {
    r#type: &'static str,
    description: &'static str,
}

/// Connection-info response for `/` and `/info`.
#[derive(Debug, Serialize)]
struct InfoResponse {
    websocket_url: String,
    websocket_url_secure: String,
    instructions: &'static str,
    supported_messages: Vec<SupportedMessage>,
}

/// `GET /` and `GET /info` — WebSocket connection instructions.
pub async fn info_handler(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map_or_else(|| state.config.bind_addr(), ToOwned::to_owned);

    (
        StatusCode::OK,
        Json(InfoResponse {
            websocket_url: format!("ws://{host}/ws"),
            websocket_url_secure: format!("wss://{host}/ws"),
            instructions: "Connect to /ws endpoint for WebSocket communication",
            supported_messages: vec![
                SupportedMessage {
                    r#type: "ping",
                    description: "Health check ping",
                },
                SupportedMessage {
                    r#type: "start_tracking",
                    description: "Start eye tracking",
                },
                SupportedMessage {
                    r#type: "stop_tracking",
                    description: "Stop eye tracking",
                },
            ],
        }),
    )
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(info_handler))
        .route("/info", get(info_handler))
}
