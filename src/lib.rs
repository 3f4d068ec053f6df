//! # gaze-gateway
//!
//! HTTP and WebSocket gateway streaming real-time eye-tracking detection
//! state. Clients connect at `/ws`, toggle tracking with JSON commands,
//! and receive periodic `eye_data` notifications produced by either a
//! simulated generator or (with the `live-camera` feature) an OpenCV
//! cascade-classifier pipeline. The detection itself is delegated to
//! OpenCV — this service is a session and capacity coordination layer.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── System Handlers (api/)          /health, /, /info
//!     ├── WS Handler (ws/handler)         /ws upgrade
//!     │
//!     ├── Session (ws/session)            per-client state machine
//!     │     ├── inbound command loop
//!     │     └── emission activity
//!     │
//!     ├── ConnectionRegistry (domain/)    capacity bound
//!     └── FrameSource (capture/)          simulated | live camera
//! ```

pub mod api;
pub mod app_state;
pub mod capture;
pub mod config;
pub mod domain;
pub mod error;
pub mod ws;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Builds the complete application router: HTTP endpoints plus the
/// WebSocket upgrade, with tracing and permissive CORS layers.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
