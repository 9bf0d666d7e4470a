//! WebSocket transport.
//!
//! One [`WsTransport`] owns at most one connection. The socket is driven by a
//! background task that forwards binary frames and lifecycle changes as
//! [`TransportEvent`]s; payloads are never interpreted here.
//!
//! There is no automatic reconnection. After `Closed` or `Errored` the
//! transport is terminal until the caller invokes [`WsTransport::connect`]
//! again.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection attempted yet.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Frames flow both ways.
    Open,
    /// Closed by either side.
    Closed,
    /// Ended by a socket-level failure.
    Failed,
}

impl ConnectionState {
    /// Whether a connection is in progress or established.
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("a connection is already {0:?}")]
    AlreadyActive(ConnectionState),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("socket error: {0}")]
    Socket(String),
}

/// Everything the transport reports.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    MessageReceived(Bytes),
    /// Graceful or abnormal closure, with the peer's reason if any.
    Closed(Option<String>),
    Errored(TransportError),
}

enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// Single-connection WebSocket client transport.
pub struct WsTransport {
    state: ConnectionState,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    task: Option<JoinHandle<()>>,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl WsTransport {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            outbound: None,
            events: None,
            task: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Starts connecting to `url`. The outcome arrives as an `Opened` or
    /// `Errored` event. Must be called from within a tokio runtime.
    pub fn connect(&mut self, url: &str) -> Result<(), TransportError> {
        if self.state.is_active() {
            return Err(TransportError::AlreadyActive(self.state));
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        info!(url = %url, "Connecting");
        self.task = Some(tokio::spawn(drive_socket(url.to_string(), event_tx, out_rx)));
        self.outbound = Some(out_tx);
        self.events = Some(event_rx);
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Queues a binary frame. Dropped silently unless the connection is open.
    pub fn send(&self, frame: Vec<u8>) {
        if self.state != ConnectionState::Open {
            trace!(state = ?self.state, bytes = frame.len(), "Dropping frame, connection not open");
            return;
        }
        if let Some(outbound) = &self.outbound {
            if outbound.send(Outbound::Frame(frame)).is_err() {
                debug!("Socket task gone, frame dropped");
            }
        }
    }

    /// Asks the peer to close. The `Closed` event follows.
    pub fn close(&self) {
        if let Some(outbound) = &self.outbound {
            let _ = outbound.send(Outbound::Close);
        }
    }

    /// Waits for the next event and applies its state transition.
    ///
    /// Pends forever when no connection was ever started, so it can sit in a
    /// `select!` next to other sources. Returns `None` once the current
    /// connection has reported its terminal event.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        let Some(events) = self.events.as_mut() else {
            return std::future::pending().await;
        };
        let event = match events.recv().await {
            Some(event) => event,
            None => {
                self.events = None;
                return None;
            }
        };

        match &event {
            TransportEvent::Opened => self.state = ConnectionState::Open,
            TransportEvent::Closed(_) => self.finish(ConnectionState::Closed),
            TransportEvent::Errored(_) => self.finish(ConnectionState::Failed),
            TransportEvent::MessageReceived(_) => {}
        }
        Some(event)
    }

    fn finish(&mut self, state: ConnectionState) {
        self.state = state;
        self.outbound = None;
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn drive_socket(
    url: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            warn!(url = %url, error = %e, "Connect failed");
            let _ = events.send(TransportEvent::Errored(TransportError::Connect(e.to_string())));
            return;
        }
    };
    info!(url = %url, "Connection open");
    let _ = events.send(TransportEvent::Opened);

    let (mut sink, mut stream) = socket.split();
    let terminal = loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Binary(data))) => {
                    let _ = events.send(TransportEvent::MessageReceived(Bytes::from(data)));
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|reason| !reason.is_empty());
                    info!(reason = ?reason, "Connection closed by peer");
                    break TransportEvent::Closed(reason);
                }
                Some(Ok(Message::Text(text))) => {
                    debug!(len = text.len(), "Ignoring text frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Socket error");
                    break TransportEvent::Errored(TransportError::Socket(e.to_string()));
                }
                None => {
                    info!("Connection stream ended");
                    break TransportEvent::Closed(None);
                }
            },
            out = outbound.recv() => match out {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = sink.send(Message::Binary(frame)).await {
                        warn!(error = %e, "Socket write failed");
                        break TransportEvent::Errored(TransportError::Socket(e.to_string()));
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    info!("Connection closed locally");
                    break TransportEvent::Closed(Some("closed by client".to_string()));
                }
            },
        }
    };
    let _ = events.send(terminal);
}
