//! WebSocket wire protocol: inbound commands and outbound notifications.
//!
//! All frames are UTF-8 JSON objects discriminated by a `type` tag.
//! Malformed JSON is a distinct [`ParseFailure`] outcome, not a command:
//! the session answers it with an `error` notification and stays open.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::DetectionResult;

/// WebSocket close code for capacity refusal ("try again later").
pub const CLOSE_AT_CAPACITY: u16 = 1013;

/// WebSocket close code used when the server shuts down.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Error message sent back for frames that are not valid JSON.
pub const INVALID_JSON_MESSAGE: &str = "Invalid JSON format";

/// Recognized client commands, as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientCommand {
    Ping,
    StartTracking,
    StopTracking,
}

/// One parsed inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    /// Health-check ping; answered with `pong` immediately.
    Ping,
    /// Enable periodic `eye_data` emission.
    StartTracking,
    /// Disable periodic emission without tearing the session down.
    StopTracking,
    /// Structurally valid JSON with an unrecognized `type` tag (kept for
    /// logging). Ignored, never answered.
    Unknown(String),
}

/// Marker for inbound payloads that are not valid JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseFailure;

impl InboundCommand {
    /// Parses one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ParseFailure`] when the frame is not valid JSON. A valid
    /// object with a missing or unrecognized `type` tag parses as
    /// [`InboundCommand::Unknown`].
    pub fn parse(text: &str) -> Result<Self, ParseFailure> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(|_| ParseFailure)?;
        let tag = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("<missing>")
            .to_owned();
        match serde_json::from_value::<ClientCommand>(value) {
            Ok(ClientCommand::Ping) => Ok(Self::Ping),
            Ok(ClientCommand::StartTracking) => Ok(Self::StartTracking),
            Ok(ClientCommand::StopTracking) => Ok(Self::StopTracking),
            Err(_) => Ok(Self::Unknown(tag)),
        }
    }
}

/// Static server identity included in the welcome notification.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Crate version.
    pub version: &'static str,
    /// Configured connection capacity.
    pub max_connections: usize,
}

/// Outbound notifications, serialized with a snake_case `type` tag.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Welcome notification sent once on successful admission.
    Connection {
        /// Human-readable greeting.
        message: String,
        /// When the notification was produced.
        timestamp: DateTime<Utc>,
        /// Server identity and configured capacity.
        server_info: ServerInfo,
    },
    /// Reply to a `ping`.
    Pong {
        /// When the reply was produced.
        timestamp: DateTime<Utc>,
    },
    /// One periodic detection-state sample.
    EyeData {
        /// When the sample was produced.
        timestamp: DateTime<Utc>,
        /// Whether a face was detected.
        face_detected: bool,
        /// Detected eye count.
        eye_count: u32,
        /// Whether the subject appears to look away.
        looking_away: bool,
        /// Detection confidence in `[0, 1]`.
        confidence: f64,
        /// Optional annotation (e.g. simulated-data marker).
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    /// Non-fatal error notification.
    Error {
        /// Human-readable error description.
        message: String,
        /// When the notification was produced.
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    /// Builds the welcome notification.
    #[must_use]
    pub fn welcome(max_connections: usize) -> Self {
        Self::Connection {
            message: "Eye tracking connected".to_owned(),
            timestamp: Utc::now(),
            server_info: ServerInfo {
                version: env!("CARGO_PKG_VERSION"),
                max_connections,
            },
        }
    }

    /// Builds a `pong` reply.
    #[must_use]
    pub fn pong() -> Self {
        Self::Pong {
            timestamp: Utc::now(),
        }
    }

    /// Wraps one detection result as an `eye_data` notification.
    #[must_use]
    pub fn eye_data(result: DetectionResult) -> Self {
        Self::EyeData {
            timestamp: result.timestamp,
            face_detected: result.face_detected,
            eye_count: result.eye_count,
            looking_away: result.looking_away,
            confidence: result.confidence,
            note: result.note,
        }
    }

    /// Builds an `error` notification.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
