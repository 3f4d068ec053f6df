//! Domain layer: session identity and connection accounting.
//!
//! This module contains the server-side domain model: the session
//! identifier newtype and the capacity-bounded registry of attached
//! WebSocket sessions.

pub mod registry;
pub mod session_id;

pub use registry::ConnectionRegistry;
pub use session_id::SessionId;
