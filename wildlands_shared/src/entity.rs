//! Entity model.
//!
//! Entities are owned by the server; the client only mirrors them. Every
//! record here is a plain value (`Copy`), so handing one out never exposes
//! the mirror's internal storage.

use std::fmt;

use crate::math::Vec3;

/// Server-assigned entity id, unique within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an entity is. Carried explicitly on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Actor,
    Item,
    Player,
}

impl EntityKind {
    /// Wire discriminant.
    pub const fn code(self) -> u8 {
        match self {
            EntityKind::Actor => 0,
            EntityKind::Item => 1,
            EntityKind::Player => 2,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(EntityKind::Actor),
            1 => Some(EntityKind::Item),
            2 => Some(EntityKind::Player),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Actor" => Some(EntityKind::Actor),
            "Item" => Some(EntityKind::Item),
            "Player" => Some(EntityKind::Player),
            _ => None,
        }
    }
}

/// One entity as reported by a `StateUpdate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    /// `false` means the entity is gone as of the update that carries it.
    pub alive: bool,
    /// Ticks since spawn.
    pub age: u32,
    pub position: Vec3,
    pub velocity: Vec3,
}

impl Entity {
    /// A live entity at rest.
    pub fn spawned(id: u32, kind: EntityKind, position: Vec3) -> Self {
        Self {
            id: EntityId(id),
            kind,
            alive: true,
            age: 0,
            position,
            velocity: Vec3::ZERO,
        }
    }

    /// Death marker for `id`; only the id matters to the client.
    pub fn dead(id: u32, kind: EntityKind) -> Self {
        Self {
            alive: false,
            ..Self::spawned(id, kind, Vec3::ZERO)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_are_stable() {
        for kind in [EntityKind::Actor, EntityKind::Item, EntityKind::Player] {
            assert_eq!(EntityKind::from_code(kind.code() as u64), Some(kind));
        }
        assert_eq!(EntityKind::from_code(3), None);
        assert_eq!(EntityKind::from_name("Item"), Some(EntityKind::Item));
        assert_eq!(EntityKind::from_name("item"), None);
    }

    #[test]
    fn dead_marker_keeps_id() {
        let e = Entity::dead(9, EntityKind::Actor);
        assert!(!e.alive);
        assert_eq!(e.id, EntityId(9));
    }
}
