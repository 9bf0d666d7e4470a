//! `wildlands_client`
//!
//! Client-side systems:
//! - WebSocket transport with explicit lifecycle events
//! - Keepalive (hello + periodic ping, round-trip measurement)
//! - Message dispatch over a closed set of message kinds
//! - World-state reconciliation into added/removed/updated deltas
//! - Presentation seam for an external renderer
//! - Session object tying the above to one connection

pub mod dispatch;
pub mod input;
pub mod keepalive;
pub mod presenter;
pub mod session;
pub mod transport;
pub mod world;

pub use session::ClientSession;
