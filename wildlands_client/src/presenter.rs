//! Presentation seam.
//!
//! The client core does not render. A [`Presenter`] implementation (scene
//! graph, UI, logger) receives entity deltas and connection events; it only
//! ever sees copies of entity state.

use wildlands_shared::{
    protocol::{ElevationMap, TerrainMap},
    wire::WireError,
};

use crate::{transport::TransportError, world::WorldDelta};

/// Consumer of session output.
pub trait Presenter {
    /// Applies one reconciled state update.
    fn apply_delta(&mut self, delta: &WorldDelta);

    fn on_opened(&mut self) {}
    fn on_notice(&mut self, _message: &str) {}
    fn on_server_error(&mut self, _code: u32, _message: &str) {}
    fn on_elevation_map(&mut self, _map: &ElevationMap) {}
    fn on_terrain_map(&mut self, _map: &TerrainMap) {}
    /// A frame, or one message in it, could not be decoded.
    fn on_protocol_error(&mut self, _error: &WireError) {}
    fn on_closed(&mut self, _reason: Option<&str>) {}
    fn on_failed(&mut self, _error: &TransportError) {}
}

/// A no-op presenter useful for headless runs.
#[derive(Default)]
pub struct NullPresenter;

impl Presenter for NullPresenter {
    fn apply_delta(&mut self, _delta: &WorldDelta) {}
}
