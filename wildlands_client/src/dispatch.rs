//! Message dispatch.
//!
//! Every decoded message goes to exactly one method of a [`MessageHandler`],
//! chosen by an exhaustive match over [`ServerMessage`]. Core kinds have
//! required methods; auxiliary kinds default to being ignored.

use tracing::{debug, warn};
use wildlands_shared::{
    protocol::{ElevationMap, ServerFrame, ServerMessage, StateUpdate, TerrainMap},
    wire::WireError,
};

/// Receives server messages, one method per kind.
pub trait MessageHandler {
    fn on_state_update(&mut self, update: StateUpdate);
    fn on_pong(&mut self, timestamp_ms: u64);
    fn on_notice(&mut self, message: String);
    fn on_error(&mut self, code: u32, message: String);

    fn on_goodbye(&mut self) {
        debug!("Goodbye ignored");
    }

    fn on_elevation_map(&mut self, map: ElevationMap) {
        debug!(width = map.width, height = map.height, "ElevationMap ignored");
    }

    fn on_terrain_map(&mut self, map: TerrainMap) {
        debug!(width = map.width, height = map.height, "TerrainMap ignored");
    }

    /// A tag in the frame carried a payload of the wrong shape.
    fn on_schema_error(&mut self, error: WireError) {
        warn!(error = %error, "Dropping message");
    }
}

/// Counts from one [`dispatch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    pub dispatched: usize,
    pub rejected: usize,
    pub ignored: usize,
}

/// Delivers every message of `frame` to `handler`, in frame order.
pub fn dispatch<H: MessageHandler + ?Sized>(frame: ServerFrame, handler: &mut H) -> DispatchStats {
    let mut stats = DispatchStats {
        ignored: frame.unknown_tags.len(),
        ..DispatchStats::default()
    };
    for tag in &frame.unknown_tags {
        debug!(tag = %tag, "Ignoring unknown message kind");
    }

    for entry in frame.messages {
        let msg = match entry {
            Ok(msg) => msg,
            Err(error) => {
                stats.rejected += 1;
                handler.on_schema_error(error);
                continue;
            }
        };
        stats.dispatched += 1;
        match msg {
            ServerMessage::StateUpdate(update) => handler.on_state_update(update),
            ServerMessage::Pong(timestamp) => handler.on_pong(timestamp),
            ServerMessage::Notice(message) => handler.on_notice(message),
            ServerMessage::Error { code, message } => handler.on_error(code, message),
            ServerMessage::Goodbye => handler.on_goodbye(),
            ServerMessage::ElevationMap(map) => handler.on_elevation_map(map),
            ServerMessage::TerrainMap(map) => handler.on_terrain_map(map),
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use wildlands_shared::{
        entity::EntityId,
        protocol::{decode_server_frame, encode_server_frame},
    };

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl MessageHandler for Recorder {
        fn on_state_update(&mut self, update: StateUpdate) {
            self.calls.push(format!("state:{}", update.entities.len()));
        }
        fn on_pong(&mut self, timestamp_ms: u64) {
            self.calls.push(format!("pong:{timestamp_ms}"));
        }
        fn on_notice(&mut self, message: String) {
            self.calls.push(format!("notice:{message}"));
        }
        fn on_error(&mut self, code: u32, message: String) {
            self.calls.push(format!("error:{code}:{message}"));
        }
        fn on_schema_error(&mut self, error: WireError) {
            self.calls.push(format!("bad:{error}"));
        }
    }

    fn empty_update() -> ServerMessage {
        ServerMessage::StateUpdate(StateUpdate {
            your_client_id: EntityId(1),
            area_size: 10.0,
            incremental: true,
            entities: Vec::new(),
        })
    }

    #[test]
    fn batched_tags_dispatch_once_each_in_frame_order() {
        let bytes =
            encode_server_frame(&[empty_update(), ServerMessage::Notice("hi".into())]).unwrap();
        let mut recorder = Recorder::default();
        let stats = dispatch(decode_server_frame(&bytes).unwrap(), &mut recorder);
        assert_eq!(recorder.calls, ["state:0", "notice:hi"]);
        assert_eq!(stats.dispatched, 2);
    }

    #[test]
    fn schema_errors_do_not_stop_the_rest_of_the_frame() {
        let frame = ServerFrame {
            messages: vec![
                Err(WireError::SchemaMismatch {
                    kind: "Error",
                    reason: "bad".into(),
                }),
                Ok(ServerMessage::Pong(3)),
            ],
            unknown_tags: vec!["Weather".into()],
        };
        let mut recorder = Recorder::default();
        let stats = dispatch(frame, &mut recorder);
        assert_eq!(recorder.calls.len(), 2);
        assert!(recorder.calls[0].starts_with("bad:"));
        assert_eq!(recorder.calls[1], "pong:3");
        assert_eq!(
            stats,
            DispatchStats {
                dispatched: 1,
                rejected: 1,
                ignored: 1
            }
        );
    }

    #[test]
    fn auxiliary_kinds_fall_back_to_defaults() {
        let frame = ServerFrame {
            messages: vec![
                Ok(ServerMessage::Goodbye),
                Ok(ServerMessage::TerrainMap(TerrainMap {
                    width: 0,
                    height: 0,
                    data: Vec::new(),
                })),
            ],
            unknown_tags: Vec::new(),
        };
        let mut recorder = Recorder::default();
        let stats = dispatch(frame, &mut recorder);
        assert!(recorder.calls.is_empty());
        assert_eq!(stats.dispatched, 2);
    }
}
