//! # Entity Registry
//!
//! Stable external ids for entities that must outlive a world: saves,
//! network messages, editor references.
//!
//! Raw entity ids are recycled and mean nothing outside their world. The
//! registry hands out `u32` ids that are stored on the entity itself (the
//! [`PersistentId`] component) and survive a snapshot export/import.
//!
//! Only entities carrying the [`Serializable`] marker are exported.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::component::{Component, RawComponent};
use super::entity::Entity;
use super::world::World;
use crate::error::{EcsError, EcsResult};

/// External id of a registered entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersistentId(pub u32);

impl Component for PersistentId {}

/// Human-readable entity name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityName(pub String);

impl Component for EntityName {}

/// Marks an entity for snapshot export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Serializable;

impl Component for Serializable {}

/// Components of one exported entity, keyed by type.
pub type ComponentMap = HashMap<TypeId, RawComponent>;

/// Exported entities keyed by external id.
pub type EntitySnapshot = BTreeMap<u32, ComponentMap>;

/// Maps external ids to entities of one world.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    ids: HashMap<u32, Entity>,
    next_id: u32,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next external id.
    pub fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Returns the number of registered entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Checks if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Spawns an entity and registers it under a fresh id.
    pub fn register_new(&mut self, world: &mut World) -> Entity {
        let id = self.next_id();
        let entity = world.spawn();
        self.register(world, id, entity)
    }

    /// Registers an existing entity under a fresh id.
    pub fn register_existing(&mut self, world: &mut World, entity: Entity) -> u32 {
        let id = self.next_id();
        self.register(world, id, entity);
        id
    }

    /// Registers `entity` under `id` and writes its [`PersistentId`].
    ///
    /// Replaces any previous mapping of `id`.
    pub fn register(&mut self, world: &mut World, id: u32, entity: Entity) -> Entity {
        world.get_or_add::<PersistentId>(entity).0 = id;
        self.ids.insert(id, entity);
        self.next_id = self.next_id.max(id.saturating_add(1));
        entity
    }

    /// Forgets an id without touching the entity.
    pub fn unregister(&mut self, id: u32) -> Option<Entity> {
        self.ids.remove(&id)
    }

    /// Looks up an entity by external id.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownEntity`] if the id is not registered.
    pub fn entity(&self, id: u32) -> EcsResult<Entity> {
        self.try_entity(id).ok_or(EcsError::UnknownEntity(id))
    }

    /// Looks up an entity by external id.
    #[must_use]
    pub fn try_entity(&self, id: u32) -> Option<Entity> {
        self.ids.get(&id).copied()
    }

    /// Iterates over `(external id, entity)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, Entity)> + '_ {
        self.ids.iter().map(|(&id, &entity)| (id, entity))
    }

    /// Unregisters the id and despawns its entity.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownEntity`] if the id is not registered.
    pub fn destroy(&mut self, world: &mut World, id: u32) -> EcsResult<()> {
        let entity = self.unregister(id).ok_or(EcsError::UnknownEntity(id))?;
        world.despawn(entity);
        Ok(())
    }

    /// Exports every registered, alive entity carrying [`Serializable`].
    #[must_use]
    pub fn serialize(&self, world: &World) -> EntitySnapshot {
        let snapshot: EntitySnapshot = self
            .ids
            .iter()
            .filter(|&(_, &entity)| world.is_alive(entity) && world.has::<Serializable>(entity))
            .map(|(&id, &entity)| {
                let components = world
                    .components(entity)
                    .into_iter()
                    .map(|raw| (raw.type_id(), raw))
                    .collect();
                (id, components)
            })
            .collect();
        debug!(entities = snapshot.len(), "registry exported");
        snapshot
    }

    /// Recreates the snapshot's entities under their original ids.
    ///
    /// Missing pools are created from the type tokens carried by each value.
    /// Afterwards [`next_id`](Self::next_id) continues past the largest
    /// imported id.
    ///
    /// Pools for an entity are resolved before it is spawned, so a failure
    /// never leaves a half-filled entity behind.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::PoolTableFull`] if a pool cannot be created.
    pub fn deserialize(&mut self, world: &mut World, snapshot: EntitySnapshot) -> EcsResult<()> {
        let count = snapshot.len();
        for (id, components) in snapshot {
            let components = components
                .into_values()
                .map(|raw| Ok((world.register_pool(raw.meta())?, raw)))
                .collect::<EcsResult<Vec<_>>>()?;

            let entity = world.spawn();
            for (pool, raw) in components {
                world.set_raw(entity, pool, raw)?;
            }
            self.register(world, id, entity);
        }
        debug!(entities = count, next_id = self.next_id, "registry imported");
        Ok(())
    }
}
