//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Invalid values fall back to their
//! defaults rather than aborting startup.

use std::time::Duration;

/// Which frame source the process constructs at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingMode {
    /// Synthetic detection data; always available.
    #[default]
    Simulated,
    /// Camera + cascade classifiers (requires the `live-camera` feature).
    Live,
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address (e.g. `0.0.0.0`).
    pub host: String,

    /// Listen port.
    pub port: u16,

    /// Maximum number of concurrently attached WebSocket sessions.
    pub max_connections: usize,

    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// `text` or `json` log output.
    pub log_format: String,

    /// Frame source variant to construct.
    pub tracking_mode: TrackingMode,

    /// Emission cadence for the simulated source.
    pub simulated_interval: Duration,

    /// Emission cadence for the live source.
    pub live_interval: Duration,

    /// Deployment environment label reported by `/health`.
    pub environment: String,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set or
    /// cannot be parsed. Calls `dotenvy::dotenv().ok()` to optionally
    /// load a `.env` file.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_owned());
        let port = parse_env("PORT", 10_000);
        let max_connections = parse_env("MAX_CONNECTIONS", 100);
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
        let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_owned());

        let tracking_mode = match std::env::var("TRACKING_MODE").ok().as_deref() {
            Some("live") | Some("LIVE") => TrackingMode::Live,
            Some("simulated") | Some("SIMULATED") | None => TrackingMode::Simulated,
            Some(other) => {
                tracing::warn!(mode = other, "unknown TRACKING_MODE, using simulated");
                TrackingMode::Simulated
            }
        };

        let simulated_interval = Duration::from_millis(parse_env("SIMULATED_INTERVAL_MS", 500));
        let live_interval = Duration::from_millis(parse_env("LIVE_INTERVAL_MS", 100));

        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_owned());

        Self {
            host,
            port,
            max_connections,
            log_level,
            log_format,
            tracking_mode,
            simulated_interval,
            live_interval,
            environment,
        }
    }

    /// Address string for the TCP listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
