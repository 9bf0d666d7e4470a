//! World-state reconciliation.
//!
//! The [`Reconciler`] mirrors server-authoritative entities and turns each
//! `StateUpdate` into added/removed/updated deltas. It is the only writer of
//! its [`WorldStore`]; everything handed out is a copy.
//!
//! Per update:
//! - `areaSize` and the local entity id are always overwritten.
//! - A full snapshot (`incremental == false`) drops every previously known
//!   entity; the local entity's record survives the clear and is then subject
//!   to the same removal rule as everything else.
//! - Alive records are upserted. Dead records are applied after all alive
//!   ones, so a dead marker wins over an alive record for the same id.
//! - Deltas are computed against the store membership before the update.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, trace};
use wildlands_shared::{
    entity::{Entity, EntityId},
    protocol::StateUpdate,
};

/// Slot-based entity storage keyed by id.
#[derive(Debug, Default)]
pub struct WorldStore {
    slots: Vec<Option<Entity>>,
    index: HashMap<EntityId, usize>,
    free: Vec<usize>,
}

impl WorldStore {
    pub fn get(&self, id: EntityId) -> Option<Entity> {
        self.index.get(&id).and_then(|&slot| self.slots[slot])
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Known ids in ascending order.
    pub fn ids(&self) -> BTreeSet<EntityId> {
        self.index.keys().copied().collect()
    }

    /// Copies of every known entity, ordered by id.
    pub fn entities(&self) -> Vec<Entity> {
        self.ids().into_iter().filter_map(|id| self.get(id)).collect()
    }

    fn upsert(&mut self, entity: Entity) {
        if let Some(&slot) = self.index.get(&entity.id) {
            self.slots[slot] = Some(entity);
            return;
        }
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entity);
                slot
            }
            None => {
                self.slots.push(Some(entity));
                self.slots.len() - 1
            }
        };
        self.index.insert(entity.id, slot);
    }

    fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let slot = self.index.remove(&id)?;
        self.free.push(slot);
        self.slots[slot].take()
    }

    /// Empties the store, returning what it held.
    fn drain(&mut self) -> BTreeMap<EntityId, Entity> {
        let drained = self
            .index
            .drain()
            .filter_map(|(id, slot)| self.slots[slot].map(|e| (id, e)))
            .collect();
        self.slots.clear();
        self.free.clear();
        drained
    }
}

/// Changes produced by one `StateUpdate`. Lists are ordered by id and
/// pairwise disjoint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldDelta {
    /// Newly visible entities, as now stored.
    pub added: Vec<Entity>,
    /// Entities gone after this update, as last known.
    pub removed: Vec<Entity>,
    /// Already known entities refreshed by this update.
    pub updated: Vec<Entity>,
    pub local_id: EntityId,
    pub area_size: f32,
    pub full_resync: bool,
}

impl WorldDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    pub fn added_ids(&self) -> BTreeSet<EntityId> {
        self.added.iter().map(|e| e.id).collect()
    }

    pub fn removed_ids(&self) -> BTreeSet<EntityId> {
        self.removed.iter().map(|e| e.id).collect()
    }

    pub fn updated_ids(&self) -> BTreeSet<EntityId> {
        self.updated.iter().map(|e| e.id).collect()
    }
}

/// Local mirror of the server's entities.
#[derive(Debug, Default)]
pub struct Reconciler {
    store: WorldStore,
    local_id: Option<EntityId>,
    area_size: f32,
    updates: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one snapshot and returns what changed.
    pub fn reconcile(&mut self, update: &StateUpdate) -> WorldDelta {
        self.area_size = update.area_size;
        self.local_id = Some(update.your_client_id);
        self.updates += 1;

        let prior_ids = self.store.ids();
        let mut dropped = BTreeMap::new();
        if !update.incremental {
            dropped = self.store.drain();
            // Sticky local copy; still removed below if this snapshot omits it.
            if let Some(local) = dropped.remove(&update.your_client_id) {
                self.store.upsert(local);
            }
        }

        let mut touched = BTreeSet::new();
        let mut dead = BTreeSet::new();
        for entity in &update.entities {
            if entity.alive {
                self.store.upsert(*entity);
                touched.insert(entity.id);
            } else {
                dead.insert(entity.id);
            }
        }

        let mut removed_ids = dead;
        if !update.incremental {
            removed_ids.extend(prior_ids.difference(&touched).copied());
        }

        let mut added = Vec::new();
        let mut updated = Vec::new();
        for &id in touched.difference(&removed_ids) {
            let Some(entity) = self.store.get(id) else {
                continue;
            };
            if prior_ids.contains(&id) {
                updated.push(entity);
            } else {
                added.push(entity);
            }
        }

        let removed: Vec<Entity> = removed_ids
            .iter()
            .filter_map(|&id| self.store.remove(id).or_else(|| dropped.get(&id).copied()))
            .collect();

        if !update.incremental {
            debug!(
                local = %update.your_client_id,
                entities = self.store.len(),
                dropped = removed.len(),
                "Full resync"
            );
        }
        trace!(
            added = added.len(),
            removed = removed.len(),
            updated = updated.len(),
            "Reconciled state update"
        );

        WorldDelta {
            added,
            removed,
            updated,
            local_id: update.your_client_id,
            area_size: update.area_size,
            full_resync: !update.incremental,
        }
    }

    pub fn store(&self) -> &WorldStore {
        &self.store
    }

    pub fn get(&self, id: EntityId) -> Option<Entity> {
        self.store.get(id)
    }

    /// Id of the entity this client controls, once known.
    pub fn local_id(&self) -> Option<EntityId> {
        self.local_id
    }

    pub fn local_entity(&self) -> Option<Entity> {
        self.local_id.and_then(|id| self.store.get(id))
    }

    pub fn area_size(&self) -> f32 {
        self.area_size
    }

    /// Number of updates applied so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }
}
