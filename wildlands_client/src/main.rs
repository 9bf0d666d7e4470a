//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p wildlands_client -- [--url ws://localhost:3030/ws] [--name Player]
//!                                    [--ping-ms 5000] [--config client.json]
//!
//! The client connects, says hello, keeps the connection alive and logs the
//! world deltas it reconciles.
//!
//! Console commands:
//!   w / a / s / d   - Move one step direction (forward/left/back/right)
//!   stop            - Stop moving
//!   move <x> <y> <z> - Send an explicit move direction
//!   status          - Show session status
//!   quit            - Disconnect and exit

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};
use wildlands_client::{
    input::{build_move, MoveKeys},
    presenter::Presenter,
    session::{ClientSession, SessionCommand, SessionEnd},
    transport::TransportError,
    world::WorldDelta,
};
use wildlands_shared::{
    config::ClientConfig,
    math::Vec3,
    protocol::{ClientMessage, ElevationMap, TerrainMap},
    wire::WireError,
};

fn parse_args() -> anyhow::Result<ClientConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = &args[i + 1];
            let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
            ClientConfig::from_json_str(&text).with_context(|| format!("parse {path}"))?
        }
        _ => ClientConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--url" if i + 1 < args.len() => {
                cfg.server_url = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.username = args[i + 1].clone();
                i += 2;
            }
            "--ping-ms" if i + 1 < args.len() => {
                cfg.ping_interval_ms = args[i + 1].parse().context("parse --ping-ms")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

/// Logs what a renderer would draw.
#[derive(Default)]
struct LogPresenter;

impl Presenter for LogPresenter {
    fn apply_delta(&mut self, delta: &WorldDelta) {
        if delta.full_resync {
            info!(area_size = delta.area_size, local = %delta.local_id, "World resync");
        }
        for e in &delta.added {
            info!(id = %e.id, kind = ?e.kind, pos = ?e.position.to_array(), "Spawned");
        }
        for e in &delta.removed {
            info!(id = %e.id, kind = ?e.kind, "Despawned");
        }
        if let Some(me) = delta.updated.iter().find(|e| e.id == delta.local_id) {
            info!(pos = ?me.position.to_array(), vel = ?me.velocity.to_array(), "You moved");
        }
    }

    fn on_notice(&mut self, message: &str) {
        println!("* {message}");
    }

    fn on_server_error(&mut self, code: u32, message: &str) {
        println!("! server error {code}: {message}");
    }

    fn on_elevation_map(&mut self, map: &ElevationMap) {
        info!(width = map.width, height = map.height, "Elevation map");
    }

    fn on_terrain_map(&mut self, map: &TerrainMap) {
        info!(width = map.width, height = map.height, "Terrain map");
    }

    fn on_protocol_error(&mut self, error: &WireError) {
        warn!(error = %error, "Protocol error");
    }

    fn on_closed(&mut self, reason: Option<&str>) {
        println!("Disconnected from the server{}", reason.map(|r| format!(": {r}")).unwrap_or_default());
    }

    fn on_failed(&mut self, error: &TransportError) {
        println!("Connection failed: {error}");
    }
}

/// Translates one console line into a session command.
fn parse_command(line: &str) -> Result<SessionCommand, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        [key @ ("w" | "a" | "s" | "d")] => {
            let mut keys = MoveKeys::default();
            keys.set_key(key.chars().next().unwrap_or_default(), true);
            Ok(SessionCommand::Send(build_move(keys)))
        }
        ["stop"] => Ok(SessionCommand::Send(build_move(MoveKeys::default()))),
        ["move", x, y, z] => {
            let parse = |s: &str| s.parse::<f32>().map_err(|e| format!("bad component {s}: {e}"));
            Ok(SessionCommand::Send(ClientMessage::Move {
                direction: Vec3::new(parse(x)?, parse(y)?, parse(z)?),
            }))
        }
        ["status"] => Ok(SessionCommand::Status),
        ["quit"] | ["exit"] => Ok(SessionCommand::Disconnect),
        _ => Err(format!("Unknown command: {line}")),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(url = %cfg.server_url, username = %cfg.username, "Starting client");

    let mut session = ClientSession::new(cfg, LogPresenter);
    session.connect().context("connect")?;

    let (command_tx, command_rx) = mpsc::channel::<SessionCommand>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_command(line) {
                Ok(cmd) => {
                    let quit = cmd == SessionCommand::Disconnect;
                    if command_tx.blocking_send(cmd).is_err() || quit {
                        break;
                    }
                }
                Err(msg) => println!("{msg}"),
            }
        }
    });

    println!("Connecting. Type 'status' for info, 'quit' to exit.");

    match session.run(command_rx).await? {
        SessionEnd::Closed(reason) => info!(reason = ?reason, "Session ended"),
        SessionEnd::Failed(error) => warn!(error = %error, "Session failed"),
    }
    info!(
        entities = session.world().store().len(),
        frames = session.frames(),
        "Final world state"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_lines_map_to_commands() {
        assert_eq!(
            parse_command("w"),
            Ok(SessionCommand::Send(ClientMessage::Move {
                direction: Vec3::new(0.0, 0.0, 1.0)
            }))
        );
        assert_eq!(
            parse_command("move -1 0 1"),
            Ok(SessionCommand::Send(ClientMessage::Move {
                direction: Vec3::new(-1.0, 0.0, 1.0)
            }))
        );
        assert_eq!(parse_command("quit"), Ok(SessionCommand::Disconnect));
        assert!(parse_command("move 1 2").is_err());
        assert!(parse_command("dance").is_err());
    }
}
