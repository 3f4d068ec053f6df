//! Plain HTTP layer: health and connection-info endpoints.
//!
//! These endpoints are static or near-static JSON with no session
//! semantics; all real work happens on the WebSocket side.

pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Builds the router with all plain HTTP endpoints.
pub fn build_router() -> Router<AppState> {
    system::routes()
}
