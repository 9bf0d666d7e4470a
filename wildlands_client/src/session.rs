//! Client session.
//!
//! A [`ClientSession`] owns everything one connection needs: the transport,
//! the keepalive timer, the world mirror and the presenter it reports to.
//! All work happens on the task that drives [`ClientSession::run`]; frames are
//! handled strictly in arrival order and a reconcile never suspends.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wildlands_shared::{
    config::ClientConfig,
    protocol::{
        decode_server_frame, encode_client_message, ClientMessage, ElevationMap, StateUpdate,
        TerrainMap,
    },
    wire::WireError,
};

use crate::{
    dispatch::{dispatch, MessageHandler},
    keepalive::{now_ms, Keepalive},
    presenter::Presenter,
    transport::{ConnectionState, TransportError, TransportEvent, WsTransport},
    world::Reconciler,
};

/// Requests from the host application to a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Send(ClientMessage),
    /// Log a one-line status summary.
    Status,
    Disconnect,
}

/// How a connection ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    Closed(Option<String>),
    Failed(TransportError),
}

/// One client connection and the state mirrored through it.
pub struct ClientSession<P: Presenter> {
    cfg: ClientConfig,
    transport: WsTransport,
    keepalive: Keepalive,
    world: Reconciler,
    presenter: P,
    frames: u64,
    protocol_errors: u64,
}

impl<P: Presenter> ClientSession<P> {
    pub fn new(cfg: ClientConfig, presenter: P) -> Self {
        let keepalive = Keepalive::new(cfg.ping_interval());
        Self {
            cfg,
            transport: WsTransport::new(),
            keepalive,
            world: Reconciler::new(),
            presenter,
            frames: 0,
            protocol_errors: 0,
        }
    }

    /// Starts a connection to the configured server with an empty world.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        self.transport.connect(&self.cfg.server_url)?;
        self.world = Reconciler::new();
        self.frames = 0;
        self.protocol_errors = 0;
        Ok(())
    }

    /// Drives the connection until it closes or fails.
    ///
    /// Dropping the command sender is treated like `Disconnect`.
    pub async fn run(
        &mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
    ) -> anyhow::Result<SessionEnd> {
        if !self.transport.state().is_active() {
            anyhow::bail!("session is not connected ({:?})", self.transport.state());
        }
        let mut commands_open = true;

        loop {
            tokio::select! {
                event = self.transport.next_event() => {
                    let Some(event) = event else {
                        self.keepalive.on_closed();
                        return Ok(SessionEnd::Closed(None));
                    };
                    if let Some(end) = self.handle_event(event) {
                        return Ok(end);
                    }
                }
                _ = self.keepalive.due() => {
                    let ping = self.keepalive.ping(now_ms());
                    debug!("Sending ping");
                    self.send(&ping);
                }
                cmd = commands.recv(), if commands_open => match cmd {
                    Some(SessionCommand::Send(msg)) => self.send(&msg),
                    Some(SessionCommand::Status) => self.log_status(),
                    Some(SessionCommand::Disconnect) => self.transport.close(),
                    None => {
                        commands_open = false;
                        self.transport.close();
                    }
                },
            }
        }
    }

    /// Applies one transport event. Returns how the session ended if this
    /// event ended it.
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<SessionEnd> {
        match event {
            TransportEvent::Opened => {
                let hello = self.keepalive.on_opened(&self.cfg.username);
                info!(username = %self.cfg.username, "Sending hello");
                self.send(&hello);
                self.presenter.on_opened();
                None
            }
            TransportEvent::MessageReceived(bytes) => {
                self.handle_frame(&bytes);
                None
            }
            TransportEvent::Closed(reason) => {
                self.keepalive.on_closed();
                info!(reason = ?reason, entities = self.world.store().len(), "Session closed");
                self.presenter.on_closed(reason.as_deref());
                Some(SessionEnd::Closed(reason))
            }
            TransportEvent::Errored(error) => {
                self.keepalive.on_closed();
                warn!(error = %error, "Session failed");
                self.presenter.on_failed(&error);
                Some(SessionEnd::Failed(error))
            }
        }
    }

    /// Decodes one frame and dispatches every message in it. Never fails:
    /// bad frames and bad messages are reported and skipped.
    pub fn handle_frame(&mut self, bytes: &[u8]) {
        self.frames += 1;
        let frame = match decode_server_frame(bytes) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(error = %error, len = bytes.len(), "Dropping undecodable frame");
                self.protocol_errors += 1;
                self.presenter.on_protocol_error(&error);
                return;
            }
        };

        let mut handler = SessionHandler {
            world: &mut self.world,
            keepalive: &mut self.keepalive,
            presenter: &mut self.presenter,
            protocol_errors: &mut self.protocol_errors,
        };
        dispatch(frame, &mut handler);
    }

    /// Encodes and sends `msg`. A no-op unless the connection is open.
    pub fn send(&self, msg: &ClientMessage) {
        match encode_client_message(msg) {
            Ok(bytes) => self.transport.send(bytes.to_vec()),
            Err(error) => warn!(error = %error, kind = ?msg.kind(), "Could not encode message"),
        }
    }

    fn log_status(&self) {
        info!(
            state = ?self.transport.state(),
            local = ?self.world.local_id(),
            entities = self.world.store().len(),
            area_size = self.world.area_size(),
            frames = self.frames,
            protocol_errors = self.protocol_errors,
            rtt_ms = ?self.last_rtt().map(|rtt| rtt.as_millis()),
            "Status"
        );
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Read-only view of the mirrored world. Stays at its last-good state
    /// after the connection ends.
    pub fn world(&self) -> &Reconciler {
        &self.world
    }

    pub fn last_rtt(&self) -> Option<Duration> {
        self.keepalive.last_rtt()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors
    }

    pub fn config(&self) -> &ClientConfig {
        &self.cfg
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }
}

/// Routes dispatched messages to the session's parts for one frame.
struct SessionHandler<'a, P> {
    world: &'a mut Reconciler,
    keepalive: &'a mut Keepalive,
    presenter: &'a mut P,
    protocol_errors: &'a mut u64,
}

impl<P: Presenter> MessageHandler for SessionHandler<'_, P> {
    fn on_state_update(&mut self, update: StateUpdate) {
        let delta = self.world.reconcile(&update);
        self.presenter.apply_delta(&delta);
    }

    fn on_pong(&mut self, timestamp_ms: u64) {
        self.keepalive.on_pong(timestamp_ms, now_ms());
    }

    fn on_notice(&mut self, message: String) {
        info!(message = %message, "Notice from server");
        self.presenter.on_notice(&message);
    }

    fn on_error(&mut self, code: u32, message: String) {
        warn!(code, message = %message, "Server error");
        self.presenter.on_server_error(code, &message);
    }

    fn on_goodbye(&mut self) {
        info!("Server said goodbye");
    }

    fn on_elevation_map(&mut self, map: ElevationMap) {
        debug!(width = map.width, height = map.height, "Elevation map received");
        self.presenter.on_elevation_map(&map);
    }

    fn on_terrain_map(&mut self, map: TerrainMap) {
        debug!(width = map.width, height = map.height, "Terrain map received");
        self.presenter.on_terrain_map(&map);
    }

    fn on_schema_error(&mut self, error: WireError) {
        warn!(error = %error, "Dropping message with unexpected shape");
        *self.protocol_errors += 1;
        self.presenter.on_protocol_error(&error);
    }
}
