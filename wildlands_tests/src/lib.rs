//! Test harness: a scripted WebSocket server and a recording presenter.
//!
//! The server plays one side of the wire protocol step by step so tests can
//! drive a real `ClientSession` over a real socket.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    WebSocketStream,
};
use tracing::debug;
use wildlands_client::{presenter::Presenter, transport::TransportError, world::WorldDelta};
use wildlands_shared::{
    protocol::{decode_client_frame, encode_server_frame, ClientMessage, ServerMessage},
    wire::WireError,
};

/// Installs a test-friendly tracing subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// One-connection WebSocket server driven by the test body.
pub struct ScriptedServer {
    listener: TcpListener,
    socket: Option<WebSocketStream<TcpStream>>,
}

impl ScriptedServer {
    /// Binds to an ephemeral localhost port. Returns the server and the URL
    /// a client should connect to.
    pub async fn bind() -> anyhow::Result<(Self, String)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("ws://{}/ws", listener.local_addr()?);
        Ok((
            Self {
                listener,
                socket: None,
            },
            url,
        ))
    }

    /// Accepts the next client and completes the WebSocket handshake.
    pub async fn accept(&mut self) -> anyhow::Result<()> {
        let (stream, peer) = self.listener.accept().await?;
        debug!(peer = %peer, "Scripted server accepted");
        self.socket = Some(accept_async(stream).await?);
        Ok(())
    }

    fn socket(&mut self) -> anyhow::Result<&mut WebSocketStream<TcpStream>> {
        self.socket
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("no client accepted"))
    }

    /// Waits for the next binary frame from the client and decodes it.
    pub async fn recv_client(&mut self) -> anyhow::Result<Vec<ClientMessage>> {
        let socket = self.socket()?;
        loop {
            match socket.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(decode_client_frame(&data)?),
                Some(Ok(Message::Close(_))) | None => anyhow::bail!("client went away"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Reads until a client message matches `pick`, skipping the rest.
    pub async fn recv_until<T>(
        &mut self,
        mut pick: impl FnMut(&ClientMessage) -> Option<T>,
    ) -> anyhow::Result<T> {
        loop {
            for msg in self.recv_client().await? {
                if let Some(found) = pick(&msg) {
                    return Ok(found);
                }
            }
        }
    }

    /// Sends `messages` batched into one frame.
    pub async fn send_frame(&mut self, messages: &[ServerMessage]) -> anyhow::Result<()> {
        let bytes = encode_server_frame(messages)?;
        self.send_raw(bytes.to_vec()).await
    }

    pub async fn send_raw(&mut self, bytes: Vec<u8>) -> anyhow::Result<()> {
        self.socket()?.send(Message::Binary(bytes)).await?;
        Ok(())
    }

    /// Closes the connection with a normal close code and `reason`.
    pub async fn close(&mut self, reason: &str) -> anyhow::Result<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason.to_string().into(),
        };
        self.socket()?.close(Some(frame)).await?;
        Ok(())
    }

    /// Waits until the client closes its side or the stream ends.
    pub async fn wait_closed(&mut self) -> anyhow::Result<()> {
        let socket = self.socket()?;
        while let Some(msg) = socket.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        Ok(())
    }
}

/// Presenter that keeps everything it is shown.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    pub opened: bool,
    pub deltas: Vec<WorldDelta>,
    pub notices: Vec<String>,
    pub server_errors: Vec<(u32, String)>,
    pub protocol_errors: Vec<WireError>,
    pub closed: Option<Option<String>>,
    pub failed: Option<TransportError>,
}

impl Presenter for RecordingPresenter {
    fn apply_delta(&mut self, delta: &WorldDelta) {
        self.deltas.push(delta.clone());
    }

    fn on_opened(&mut self) {
        self.opened = true;
    }

    fn on_notice(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }

    fn on_server_error(&mut self, code: u32, message: &str) {
        self.server_errors.push((code, message.to_string()));
    }

    fn on_protocol_error(&mut self, error: &WireError) {
        self.protocol_errors.push(error.clone());
    }

    fn on_closed(&mut self, reason: Option<&str>) {
        self.closed = Some(reason.map(str::to_string));
    }

    fn on_failed(&mut self, error: &TransportError) {
        self.failed = Some(error.clone());
    }
}
