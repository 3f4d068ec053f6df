//! Gateway error types.
//!
//! [`GatewayError`] covers process-level failures (startup, bind,
//! capture-source construction). For HTTP handlers it renders as a 500
//! with the `{"status":"unhealthy","error":...}` body the health contract
//! specifies. WebSocket-level failures have their own types
//! ([`crate::capture::CaptureError`],
//! [`crate::ws::transport::TransportError`]) and never surface here.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::capture::CaptureError;

/// Body of a 500 response.
#[derive(Debug, Serialize)]
pub struct UnhealthyResponse {
    /// Always `"unhealthy"`.
    pub status: &'static str,
    /// Human-readable failure description.
    pub error: String,
}

/// Server-side error enum.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Frame-source construction failure.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Socket bind or other I/O failure at startup.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else that should take the handler down a 500 path.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = UnhealthyResponse {
            status: "unhealthy",
            error: self.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
