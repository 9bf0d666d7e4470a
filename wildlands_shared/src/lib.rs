//! `wildlands_shared`
//!
//! Protocol libraries shared by the client and its test server.
//!
//! Layers, leaves first:
//! - `wire`: tagged-map MessagePack frames, no message knowledge.
//! - `protocol`: typed messages and per-tag payload validation.
//! - `entity`, `math`: value types carried by the messages.
//! - `config`: client settings.

pub mod config;
pub mod entity;
pub mod math;
pub mod protocol;
pub mod wire;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::entity::*;
    pub use crate::math::*;
    pub use crate::protocol::*;
    pub use crate::wire::{TaggedMap, WireError};
}
