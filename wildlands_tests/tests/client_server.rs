//! Full socket-based integration tests for the client session against a
//! scripted server.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::mpsc;
use wildlands_client::{
    session::{SessionCommand, SessionEnd},
    transport::{ConnectionState, TransportError},
    ClientSession,
};
use wildlands_shared::{
    config::ClientConfig,
    entity::{Entity, EntityId, EntityKind},
    math::Vec3,
    protocol::{
        decode_client_frame, decode_server_frame, encode_client_message, encode_server_frame,
        ClientMessage, ServerMessage, StateUpdate,
    },
};
use wildlands_tests::{init_tracing, RecordingPresenter, ScriptedServer};

fn config(url: String, ping_interval_ms: u64) -> ClientConfig {
    ClientConfig {
        server_url: url,
        username: "tester".to_string(),
        ping_interval_ms,
    }
}

fn update(incremental: bool, entities: Vec<Entity>) -> ServerMessage {
    ServerMessage::StateUpdate(StateUpdate {
        your_client_id: EntityId(1),
        area_size: 64.0,
        incremental,
        entities,
    })
}

fn ids(raw: &[u32]) -> BTreeSet<EntityId> {
    raw.iter().copied().map(EntityId).collect()
}

/// Unit-style test: both directions of the protocol survive encoding.
#[test]
fn protocol_messages_roundtrip() -> anyhow::Result<()> {
    let moves = ClientMessage::Move {
        direction: Vec3::new(1.0, 0.0, -1.0),
    };
    assert_eq!(decode_client_frame(&encode_client_message(&moves)?)?, vec![moves]);

    let messages = [
        update(false, vec![Entity::spawned(1, EntityKind::Player, Vec3::ZERO)]),
        ServerMessage::Error {
            code: 1,
            message: "username taken".to_string(),
        },
    ];
    let frame = decode_server_frame(&encode_server_frame(&messages)?)?;
    let decoded: Vec<ServerMessage> = frame.messages.into_iter().collect::<Result<_, _>>()?;
    assert_eq!(decoded, messages);
    assert!(frame.unknown_tags.is_empty());

    Ok(())
}

/// Hello, a batched snapshot, a garbage frame, an incremental death, then a
/// server close. The world must end at its last-good state.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn session_mirrors_scripted_world() -> anyhow::Result<()> {
    init_tracing();
    let (mut server, url) = ScriptedServer::bind().await?;

    let server_handle = tokio::spawn(async move {
        server.accept().await?;
        let hello = server.recv_client().await?;
        anyhow::ensure!(
            hello
                == vec![ClientMessage::Hello {
                    username: "tester".to_string()
                }],
            "expected hello first, got {hello:?}"
        );

        server
            .send_frame(&[
                ServerMessage::Notice("welcome".to_string()),
                update(
                    false,
                    vec![
                        Entity::spawned(1, EntityKind::Player, Vec3::new(1.0, 0.0, 1.0)),
                        Entity::spawned(2, EntityKind::Actor, Vec3::new(5.0, 0.0, 5.0)),
                        Entity::spawned(3, EntityKind::Item, Vec3::new(-2.0, 0.0, 4.0)),
                    ],
                ),
            ])
            .await?;
        // 0xc1 is never a valid MessagePack marker.
        server.send_raw(vec![0xc1]).await?;
        server
            .send_frame(&[update(
                true,
                vec![
                    Entity::dead(2, EntityKind::Actor),
                    Entity::spawned(1, EntityKind::Player, Vec3::new(2.0, 0.0, 1.0)),
                ],
            )])
            .await?;
        server.close("round over").await?;
        Ok::<_, anyhow::Error>(())
    });

    let mut session = ClientSession::new(config(url, 5_000), RecordingPresenter::default());
    session.connect()?;
    let (_commands, rx) = mpsc::channel(8);
    let end = tokio::time::timeout(Duration::from_secs(5), session.run(rx)).await??;

    server_handle.await??;

    assert_eq!(end, SessionEnd::Closed(Some("round over".to_string())));
    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(session.frames(), 3);
    assert_eq!(session.protocol_errors(), 1);

    let presenter = session.presenter();
    assert!(presenter.opened);
    assert_eq!(presenter.notices, ["welcome"]);
    assert_eq!(presenter.protocol_errors.len(), 1);
    assert_eq!(presenter.closed, Some(Some("round over".to_string())));
    assert_eq!(presenter.deltas.len(), 2);

    let first = &presenter.deltas[0];
    assert!(first.full_resync);
    assert_eq!(first.added_ids(), ids(&[1, 2, 3]));
    assert!(first.removed.is_empty() && first.updated.is_empty());

    let second = &presenter.deltas[1];
    assert!(!second.full_resync);
    assert_eq!(second.removed_ids(), ids(&[2]));
    assert_eq!(second.updated_ids(), ids(&[1]));
    assert!(second.added.is_empty());

    let world = session.world();
    assert_eq!(world.store().ids(), ids(&[1, 3]));
    assert_eq!(world.local_id(), Some(EntityId(1)));
    assert_eq!(
        world.local_entity().map(|e| e.position),
        Some(Vec3::new(2.0, 0.0, 1.0))
    );
    assert_eq!(world.area_size(), 64.0);

    Ok(())
}

/// Pings flow on the configured period and echoed pongs yield a round trip.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn keepalive_pings_and_measures_rtt() -> anyhow::Result<()> {
    init_tracing();
    let (mut server, url) = ScriptedServer::bind().await?;

    let server_handle = tokio::spawn(async move {
        server.accept().await?;
        let timestamp = server
            .recv_until(|msg| match msg {
                ClientMessage::Ping { timestamp } => Some(*timestamp),
                _ => None,
            })
            .await?;
        server.send_frame(&[ServerMessage::Pong(timestamp)]).await?;
        server.close("done").await?;
        Ok::<_, anyhow::Error>(())
    });

    let mut session = ClientSession::new(config(url, 20), RecordingPresenter::default());
    session.connect()?;
    let (_commands, rx) = mpsc::channel(8);
    let end = tokio::time::timeout(Duration::from_secs(5), session.run(rx)).await??;

    server_handle.await??;

    assert_eq!(end, SessionEnd::Closed(Some("done".to_string())));
    assert!(session.last_rtt().is_some(), "expected a measured round trip");

    Ok(())
}

/// The client's own moves arrive after hello, and `Disconnect` closes the
/// connection from the client side.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commands_send_moves_and_disconnect() -> anyhow::Result<()> {
    init_tracing();
    let (mut server, url) = ScriptedServer::bind().await?;
    let (commands, rx) = mpsc::channel(8);

    let server_handle = tokio::spawn(async move {
        server.accept().await?;
        server
            .recv_until(|msg| matches!(msg, ClientMessage::Hello { .. }).then_some(()))
            .await?;
        // Moves are only sent once the connection is open, so queue after hello.
        commands
            .send(SessionCommand::Send(ClientMessage::Move {
                direction: Vec3::new(0.0, 0.0, 1.0),
            }))
            .await?;
        let direction = server
            .recv_until(|msg| match msg {
                ClientMessage::Move { direction } => Some(*direction),
                _ => None,
            })
            .await?;
        commands.send(SessionCommand::Disconnect).await?;
        server.wait_closed().await?;
        Ok::<_, anyhow::Error>(direction)
    });

    let mut session = ClientSession::new(config(url, 5_000), RecordingPresenter::default());
    session.connect()?;
    let end = tokio::time::timeout(Duration::from_secs(5), session.run(rx)).await??;

    let direction = server_handle.await??;
    assert_eq!(direction, Vec3::new(0.0, 0.0, 1.0));
    assert!(matches!(end, SessionEnd::Closed(_)));
    assert_eq!(session.state(), ConnectionState::Closed);

    Ok(())
}

/// Nothing listening: the session fails and the world stays empty.
#[tokio::test]
async fn refused_connection_fails_session() -> anyhow::Result<()> {
    init_tracing();
    let (server, url) = ScriptedServer::bind().await?;
    drop(server);

    let mut session = ClientSession::new(config(url, 5_000), RecordingPresenter::default());
    session.connect()?;
    let (_commands, rx) = mpsc::channel(8);
    let end = tokio::time::timeout(Duration::from_secs(5), session.run(rx)).await??;

    assert!(matches!(end, SessionEnd::Failed(TransportError::Connect(_))));
    assert_eq!(session.state(), ConnectionState::Failed);
    assert!(session.world().store().is_empty());
    assert!(session.presenter().failed.is_some());

    Ok(())
}
