//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::capture::FrameSupply;
use crate::config::GatewayConfig;
use crate::domain::ConnectionRegistry;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Capacity-bounded registry of attached sessions.
    pub registry: Arc<ConnectionRegistry>,
    /// Process-level frame source handle.
    pub frames: FrameSupply,
    /// Configuration snapshot, for health/info payloads.
    pub config: Arc<GatewayConfig>,
    /// Root shutdown token; sessions derive child tokens from it.
    pub shutdown: CancellationToken,
}
