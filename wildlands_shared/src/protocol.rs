//! Message schema.
//!
//! Typed records for every message kind in the catalogue, plus conversion
//! to and from the untyped payloads carried by [`TaggedMap`] frames.
//!
//! Client -> server: `Hello`, `Ping`, `Move`.
//! Server -> client: `StateUpdate`, `Pong`, `Notice`, `Error`, `Goodbye`,
//! `ElevationMap`, `TerrainMap`.
//!
//! Decoding a server frame never fails as a whole once the codec accepted it:
//! each tag is decoded on its own, a bad payload becomes a per-tag
//! [`WireError::SchemaMismatch`] and unknown tags are set aside.

use bytes::Bytes;
use rmpv::Value;

use crate::{
    entity::{Entity, EntityId, EntityKind},
    math::Vec3,
    wire::{self, TaggedMap, WireError},
};

/// One world snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    /// Entity controlled by this client.
    pub your_client_id: EntityId,
    pub area_size: f32,
    /// `true`: only changed entities are listed. `false`: full world state.
    pub incremental: bool,
    pub entities: Vec<Entity>,
}

/// Per-cell elevation samples, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

/// Per-cell terrain type codes, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Server -> client messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    StateUpdate(StateUpdate),
    /// Echo of the timestamp carried by a `Ping`, in ms.
    Pong(u64),
    Notice(String),
    Error { code: u32, message: String },
    Goodbye,
    ElevationMap(ElevationMap),
    TerrainMap(TerrainMap),
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Hello { username: String },
    /// Client clock in ms since the Unix epoch.
    Ping { timestamp: u64 },
    /// Direction with components in {-1, 0, 1} by convention.
    Move { direction: Vec3 },
}

/// Message kind tags as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Hello,
    Ping,
    Move,
    StateUpdate,
    Pong,
    Notice,
    Error,
    Goodbye,
    ElevationMap,
    TerrainMap,
}

impl MessageKind {
    pub const fn tag(self) -> &'static str {
        match self {
            MessageKind::Hello => "Hello",
            MessageKind::Ping => "Ping",
            MessageKind::Move => "Move",
            MessageKind::StateUpdate => "StateUpdate",
            MessageKind::Pong => "Pong",
            MessageKind::Notice => "Notice",
            MessageKind::Error => "Error",
            MessageKind::Goodbye => "Goodbye",
            MessageKind::ElevationMap => "ElevationMap",
            MessageKind::TerrainMap => "TerrainMap",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "Hello" => MessageKind::Hello,
            "Ping" => MessageKind::Ping,
            "Move" => MessageKind::Move,
            "StateUpdate" => MessageKind::StateUpdate,
            "Pong" => MessageKind::Pong,
            "Notice" => MessageKind::Notice,
            "Error" => MessageKind::Error,
            "Goodbye" => MessageKind::Goodbye,
            "ElevationMap" => MessageKind::ElevationMap,
            "TerrainMap" => MessageKind::TerrainMap,
            _ => return None,
        })
    }
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::StateUpdate(_) => MessageKind::StateUpdate,
            ServerMessage::Pong(_) => MessageKind::Pong,
            ServerMessage::Notice(_) => MessageKind::Notice,
            ServerMessage::Error { .. } => MessageKind::Error,
            ServerMessage::Goodbye => MessageKind::Goodbye,
            ServerMessage::ElevationMap(_) => MessageKind::ElevationMap,
            ServerMessage::TerrainMap(_) => MessageKind::TerrainMap,
        }
    }

    /// Builds the untyped payload for this message.
    pub fn to_payload(&self) -> Value {
        match self {
            ServerMessage::StateUpdate(update) => Value::Array(vec![
                Value::from(update.your_client_id.0),
                Value::from(update.area_size),
                Value::from(update.incremental),
                Value::Array(update.entities.iter().map(entity_to_value).collect()),
            ]),
            ServerMessage::Pong(timestamp) => Value::from(*timestamp),
            ServerMessage::Notice(message) => Value::from(message.as_str()),
            ServerMessage::Error { code, message } => {
                Value::Array(vec![Value::from(*code), Value::from(message.as_str())])
            }
            ServerMessage::Goodbye => Value::Array(Vec::new()),
            ServerMessage::ElevationMap(map) => Value::Array(vec![
                Value::from(map.width),
                Value::from(map.height),
                Value::Array(map.data.iter().map(|v| Value::from(*v)).collect()),
            ]),
            ServerMessage::TerrainMap(map) => Value::Array(vec![
                Value::from(map.width),
                Value::from(map.height),
                Value::Binary(map.data.clone()),
            ]),
        }
    }

    /// Decodes the payload found under a known server tag.
    pub fn from_payload(kind: MessageKind, payload: &Value) -> Result<Self, WireError> {
        let tag = kind.tag();
        match kind {
            MessageKind::StateUpdate => {
                let [client_id, area_size, incremental, entities] = fields::<4>(tag, payload)?;
                let entities = as_array(tag, "entities", entities)?
                    .iter()
                    .enumerate()
                    .map(|(i, e)| entity_from_value(i, e))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ServerMessage::StateUpdate(StateUpdate {
                    your_client_id: EntityId(as_u32(tag, "yourClientId", client_id)?),
                    area_size: as_f32(tag, "areaSize", area_size)?,
                    incremental: as_bool(tag, "incremental", incremental)?,
                    entities,
                }))
            }
            MessageKind::Pong => Ok(ServerMessage::Pong(as_timestamp(tag, payload)?)),
            MessageKind::Notice => Ok(ServerMessage::Notice(
                as_str(tag, "message", payload)?.to_owned(),
            )),
            MessageKind::Error => {
                let [code, message] = fields::<2>(tag, payload)?;
                Ok(ServerMessage::Error {
                    code: as_u32(tag, "code", code)?,
                    message: as_str(tag, "message", message)?.to_owned(),
                })
            }
            MessageKind::Goodbye => match payload {
                Value::Nil => Ok(ServerMessage::Goodbye),
                Value::Array(items) if items.is_empty() => Ok(ServerMessage::Goodbye),
                other => Err(WireError::mismatch(
                    tag,
                    format!("expected empty payload, got {other}"),
                )),
            },
            MessageKind::ElevationMap => {
                let (width, height, data) = grid_fields(tag, payload)?;
                let data = as_array(tag, "data", data)?
                    .iter()
                    .map(|v| as_f32(tag, "data", v))
                    .collect::<Result<Vec<_>, _>>()?;
                check_grid(tag, width, height, data.len())?;
                Ok(ServerMessage::ElevationMap(ElevationMap {
                    width,
                    height,
                    data,
                }))
            }
            MessageKind::TerrainMap => {
                let (width, height, data) = grid_fields(tag, payload)?;
                let data = as_bytes(tag, data)?;
                check_grid(tag, width, height, data.len())?;
                Ok(ServerMessage::TerrainMap(TerrainMap {
                    width,
                    height,
                    data,
                }))
            }
            MessageKind::Hello | MessageKind::Ping | MessageKind::Move => Err(
                WireError::mismatch(tag, "client message in a server frame"),
            ),
        }
    }
}

impl ClientMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ClientMessage::Hello { .. } => MessageKind::Hello,
            ClientMessage::Ping { .. } => MessageKind::Ping,
            ClientMessage::Move { .. } => MessageKind::Move,
        }
    }

    pub fn to_payload(&self) -> Value {
        match self {
            ClientMessage::Hello { username } => Value::from(username.as_str()),
            ClientMessage::Ping { timestamp } => Value::from(*timestamp),
            ClientMessage::Move { direction } => vec3_to_value(*direction),
        }
    }

    pub fn from_payload(kind: MessageKind, payload: &Value) -> Result<Self, WireError> {
        let tag = kind.tag();
        match kind {
            MessageKind::Hello => Ok(ClientMessage::Hello {
                username: as_str(tag, "username", payload)?.to_owned(),
            }),
            MessageKind::Ping => Ok(ClientMessage::Ping {
                timestamp: as_timestamp(tag, payload)?,
            }),
            MessageKind::Move => Ok(ClientMessage::Move {
                direction: as_vec3(tag, "direction", payload)?,
            }),
            _ => Err(WireError::mismatch(tag, "server message in a client frame")),
        }
    }
}

/// Result of decoding one server frame, in the frame's tag order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServerFrame {
    pub messages: Vec<Result<ServerMessage, WireError>>,
    /// Tags this client does not know; skipped for forward compatibility.
    pub unknown_tags: Vec<String>,
}

/// Decodes a received frame. Only codec-level failures are returned as `Err`.
pub fn decode_server_frame(bytes: &[u8]) -> Result<ServerFrame, WireError> {
    let map = wire::decode(bytes)?;
    let mut frame = ServerFrame::default();
    for (tag, payload) in map {
        match MessageKind::from_tag(&tag) {
            Some(kind) => frame
                .messages
                .push(ServerMessage::from_payload(kind, &payload)),
            None => frame.unknown_tags.push(tag),
        }
    }
    Ok(frame)
}

/// Encodes a batch of server messages into one frame.
pub fn encode_server_frame(messages: &[ServerMessage]) -> Result<Bytes, WireError> {
    let mut map = TaggedMap::new();
    for msg in messages {
        map.push(msg.kind().tag(), msg.to_payload());
    }
    wire::encode(&map)
}

/// Encodes one client message as its own frame.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Bytes, WireError> {
    let mut map = TaggedMap::new();
    map.push(msg.kind().tag(), msg.to_payload());
    wire::encode(&map)
}

/// Decodes a client frame. Unknown tags are skipped; bad payloads fail.
pub fn decode_client_frame(bytes: &[u8]) -> Result<Vec<ClientMessage>, WireError> {
    wire::decode(bytes)?
        .iter()
        .filter_map(|(tag, payload)| {
            MessageKind::from_tag(tag).map(|kind| ClientMessage::from_payload(kind, payload))
        })
        .collect()
}

fn entity_to_value(e: &Entity) -> Value {
    Value::Array(vec![
        Value::from(e.alive),
        Value::from(e.age),
        Value::from(e.id.0),
        Value::from(e.kind.code()),
        vec3_to_value(e.position),
        vec3_to_value(e.velocity),
    ])
}

fn entity_from_value(index: usize, v: &Value) -> Result<Entity, WireError> {
    const TAG: &str = "StateUpdate";
    let [alive, age, id, kind, position, velocity] = fields::<6>(TAG, v)
        .map_err(|e| WireError::mismatch(TAG, format!("entity {index}: {e}")))?;
    Ok(Entity {
        alive: as_bool(TAG, "alive", alive)?,
        age: as_u32(TAG, "age", age)?,
        id: EntityId(as_u32(TAG, "id", id)?),
        kind: as_kind(kind)?,
        position: as_vec3(TAG, "position", position)?,
        velocity: as_vec3(TAG, "velocity", velocity)?,
    })
}

fn vec3_to_value(v: Vec3) -> Value {
    Value::Array(v.to_array().into_iter().map(Value::from).collect())
}

fn fields<'a, const N: usize>(kind: &'static str, v: &'a Value) -> Result<[&'a Value; N], WireError> {
    let items = as_array(kind, "payload", v)?;
    if items.len() != N {
        return Err(WireError::mismatch(
            kind,
            format!("expected {N} fields, got {}", items.len()),
        ));
    }
    Ok(std::array::from_fn(|i| &items[i]))
}

/// `[width, height, data]` or `{width, height, data}`.
fn grid_fields<'a>(kind: &'static str, v: &'a Value) -> Result<(u32, u32, &'a Value), WireError> {
    if let Value::Map(pairs) = v {
        let field = |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| k.as_str() == Some(name))
                .map(|(_, v)| v)
                .ok_or_else(|| WireError::mismatch(kind, format!("missing field {name}")))
        };
        return Ok((
            as_u32(kind, "width", field("width")?)?,
            as_u32(kind, "height", field("height")?)?,
            field("data")?,
        ));
    }
    let [width, height, data] = fields::<3>(kind, v)?;
    Ok((
        as_u32(kind, "width", width)?,
        as_u32(kind, "height", height)?,
        data,
    ))
}

fn check_grid(kind: &'static str, width: u32, height: u32, len: usize) -> Result<(), WireError> {
    let expected = width as u64 * height as u64;
    if expected != len as u64 {
        return Err(WireError::mismatch(
            kind,
            format!("{width}x{height} grid carries {len} cells"),
        ));
    }
    Ok(())
}

fn as_array<'a>(kind: &'static str, field: &str, v: &'a Value) -> Result<&'a [Value], WireError> {
    match v {
        Value::Array(items) => Ok(items),
        other => Err(WireError::mismatch(
            kind,
            format!("{field}: expected array, got {other}"),
        )),
    }
}

fn as_bool(kind: &'static str, field: &str, v: &Value) -> Result<bool, WireError> {
    v.as_bool()
        .ok_or_else(|| WireError::mismatch(kind, format!("{field}: expected bool, got {v}")))
}

fn as_str<'a>(kind: &'static str, field: &str, v: &'a Value) -> Result<&'a str, WireError> {
    v.as_str()
        .ok_or_else(|| WireError::mismatch(kind, format!("{field}: expected string, got {v}")))
}

fn as_u32(kind: &'static str, field: &str, v: &Value) -> Result<u32, WireError> {
    v.as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| WireError::mismatch(kind, format!("{field}: expected u32, got {v}")))
}

/// Any number; integers are widened.
fn as_f32(kind: &'static str, field: &str, v: &Value) -> Result<f32, WireError> {
    let n = match v {
        Value::F32(n) => Some(*n),
        Value::F64(n) => Some(*n as f32),
        Value::Integer(n) => n.as_f64().map(|n| n as f32),
        _ => None,
    };
    n.ok_or_else(|| WireError::mismatch(kind, format!("{field}: expected number, got {v}")))
}

/// Millisecond timestamps; some peers send them as floats.
fn as_timestamp(kind: &'static str, v: &Value) -> Result<u64, WireError> {
    let n = match v {
        Value::Integer(n) => n.as_u64(),
        Value::F64(n) if *n >= 0.0 && n.is_finite() => Some(*n as u64),
        Value::F32(n) if *n >= 0.0 && n.is_finite() => Some(*n as u64),
        _ => None,
    };
    n.ok_or_else(|| WireError::mismatch(kind, format!("expected timestamp, got {v}")))
}

fn as_vec3(kind: &'static str, field: &str, v: &Value) -> Result<Vec3, WireError> {
    let [x, y, z] = fields::<3>(kind, v)
        .map_err(|e| WireError::mismatch(kind, format!("{field}: {e}")))?;
    Ok(Vec3::new(
        as_f32(kind, field, x)?,
        as_f32(kind, field, y)?,
        as_f32(kind, field, z)?,
    ))
}

fn as_kind(v: &Value) -> Result<EntityKind, WireError> {
    let kind = match v {
        Value::Integer(n) => n.as_u64().and_then(EntityKind::from_code),
        Value::String(_) => v.as_str().and_then(EntityKind::from_name),
        _ => None,
    };
    kind.ok_or_else(|| WireError::mismatch("StateUpdate", format!("kind: unknown entity kind {v}")))
}

fn as_bytes(kind: &'static str, v: &Value) -> Result<Vec<u8>, WireError> {
    match v {
        Value::Binary(data) => Ok(data.clone()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| WireError::mismatch(kind, format!("data: expected byte, got {item}")))
            })
            .collect(),
        other => Err(WireError::mismatch(
            kind,
            format!("data: expected bytes, got {other}"),
        )),
    }
}
