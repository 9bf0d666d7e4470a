//! Wire codec.
//!
//! A frame is a MessagePack map from a string tag (the message kind) to an
//! arbitrary payload. Several tags may share one frame, including repeats of
//! the same tag; their order is the encoding order and is preserved in both
//! directions, so encoding a given [`TaggedMap`] always yields the same bytes.
//!
//! This layer knows nothing about message shapes. See [`crate::protocol`].

use bytes::Bytes;
use rmpv::Value;
use thiserror::Error;

/// Errors produced by the codec and the schema decoders.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WireError {
    /// The frame could not be parsed as a tagged map.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// The frame parsed, but a payload does not have the expected shape.
    #[error("schema mismatch in {kind}: {reason}")]
    SchemaMismatch { kind: &'static str, reason: String },
    #[error("encode failed: {0}")]
    Encode(String),
}

impl WireError {
    pub(crate) fn mismatch(kind: &'static str, reason: impl Into<String>) -> Self {
        WireError::SchemaMismatch {
            kind,
            reason: reason.into(),
        }
    }
}

/// Ordered tag -> payload mapping; the unit of wire decoding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaggedMap {
    entries: Vec<(String, Value)>,
}

impl TaggedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `tag` with its payload. Repeated tags are kept in order.
    pub fn push(&mut self, tag: impl Into<String>, payload: Value) {
        self.entries.push((tag.into(), payload));
    }

    /// First payload carried under `tag`.
    pub fn get(&self, tag: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, payload)| payload)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(t, v)| (t.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for TaggedMap {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Encodes a tagged map into one frame.
pub fn encode(map: &TaggedMap) -> Result<Bytes, WireError> {
    let value = Value::Map(
        map.entries
            .iter()
            .map(|(tag, payload)| (Value::from(tag.as_str()), payload.clone()))
            .collect(),
    );
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &value).map_err(|e| WireError::Encode(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Decodes one frame. Truncated, corrupt or non-map input is a
/// [`WireError::MalformedFrame`].
///
/// A key that is not a string is kept under its printed form, which no
/// message kind matches, so the tags beside it still decode.
pub fn decode(bytes: &[u8]) -> Result<TaggedMap, WireError> {
    let mut cursor = bytes;
    let value = rmpv::decode::read_value(&mut cursor)
        .map_err(|e| WireError::MalformedFrame(e.to_string()))?;
    if !cursor.is_empty() {
        return Err(WireError::MalformedFrame(format!(
            "{} trailing bytes after frame",
            cursor.len()
        )));
    }

    let Value::Map(pairs) = value else {
        return Err(WireError::MalformedFrame(
            "frame is not a tagged map".to_string(),
        ));
    };

    let mut entries = Vec::with_capacity(pairs.len());
    for (key, payload) in pairs {
        let tag = match key.as_str() {
            Some(tag) => tag.to_owned(),
            None => key.to_string(),
        };
        entries.push((tag, payload));
    }
    Ok(TaggedMap { entries })
}
