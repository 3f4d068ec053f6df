//! WebSocket layer: session lifecycle, wire protocol, transport seam.
//!
//! The endpoint at `/ws` upgrades clients into [`session::Session`]s,
//! which stream periodic detection-state notifications while tracking is
//! enabled.

pub mod handler;
pub mod messages;
pub mod session;
pub mod transport;
