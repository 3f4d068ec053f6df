//! Transport seam between the session state machine and the socket.
//!
//! The session protocol is transport-agnostic: it only needs to send
//! notifications, receive frames, and close with a code. [`WsTransport`]
//! adapts an axum WebSocket; tests drive sessions through a channel-backed
//! mock instead.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};

use super::messages::ServerMessage;

/// Transport-level send/receive failure. Terminal for the session.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Underlying socket I/O or serialization failure.
    #[error("websocket i/o error: {0}")]
    Io(String),

    /// The peer is gone.
    #[error("connection closed")]
    Closed,
}

/// One inbound frame, reduced to what the session protocol cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A text frame carrying a (possibly malformed) JSON command.
    Text(String),
    /// The peer requested a close.
    Close,
    /// Binary/ping/pong frames the protocol ignores.
    Other,
}

/// Bidirectional message transport for one session.
///
/// At most one send is in flight at a time: the session task is the only
/// caller, so writes are never interleaved.
#[async_trait]
pub trait Transport: Send {
    /// Serializes and sends one notification.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the peer is gone or the write
    /// fails; the session treats this as terminal.
    async fn send(&mut self, msg: &ServerMessage) -> Result<(), TransportError>;

    /// Receives the next frame. `None` means the stream has ended.
    async fn recv(&mut self) -> Option<Result<Incoming, TransportError>>;

    /// Sends a close frame with the given code and reason.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the close frame cannot be written;
    /// callers on teardown paths may ignore it.
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// [`Transport`] implementation over an upgraded axum WebSocket.
pub struct WsTransport {
    socket: WebSocket,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport").finish_non_exhaustive()
    }
}

impl WsTransport {
    /// Wraps an upgraded socket.
    #[must_use]
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, msg: &ServerMessage) -> Result<(), TransportError> {
        let json = serde_json::to_string(msg).map_err(|err| TransportError::Io(err.to_string()))?;
        self.socket
            .send(Message::text(json))
            .await
            .map_err(|err| TransportError::Io(err.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Incoming, TransportError>> {
        match self.socket.recv().await? {
            Ok(Message::Text(text)) => Some(Ok(Incoming::Text(text.to_string()))),
            Ok(Message::Close(_)) => Some(Ok(Incoming::Close)),
            Ok(_) => Some(Ok(Incoming::Other)),
            Err(err) => Some(Err(TransportError::Io(err.to_string()))),
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code,
            reason: Utf8Bytes::from(reason),
        };
        self.socket
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|err| TransportError::Io(err.to_string()))
    }
}
