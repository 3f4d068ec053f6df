//! Axum WebSocket upgrade handler.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;

use super::session::Session;
use super::transport::WsTransport;
use crate::app_state::AppState;

/// `GET /ws` — Upgrade the HTTP connection and hand it to a [`Session`].
///
/// Capacity is checked by the session after the upgrade so that refusal
/// can be delivered as a proper close frame (code 1013).
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let registry = Arc::clone(&state.registry);
    let supply = state.frames.clone();
    let shutdown = state.shutdown.clone();

    ws.on_upgrade(move |socket| async move {
        Session::new(
            WsTransport::new(socket),
            addr.to_string(),
            registry,
            supply,
            &shutdown,
        )
        .run()
        .await;
    })
}
