//! # Component Pools
//!
//! One sparse set per component type:
//!
//! ```text
//! sparse:  [0, 2, 0, 1, 0, ...]   entity -> dense index + 1 (0 = absent)
//! dense:   [C(e3), C(e1)]          live values, packed
//! owners:  [e3, e1]                dense index -> entity
//! recycled: [C, C, ...]            reset values reused by the next add
//! ```
//!
//! Pools only manage their own storage. Keeping the raw entity slots and the
//! filters in sync is the world's job, so every structural change goes
//! through [`World`](super::World).

use std::any::Any;
use std::fmt;

use super::component::{Component, ComponentMeta, RawComponent};
use super::entity::Entity;
use crate::error::EcsError;

/// Index of a pool inside its world.
///
/// Pool ids are stored in raw entity slots, so they share the slot value
/// type and top out at `i16::MAX`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PoolId(i16);

impl PoolId {
    /// Largest number of pools a world can hold.
    pub const MAX_POOLS: usize = i16::MAX as usize;

    /// Creates a pool id from its raw slot value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: i16) -> Self {
        Self(raw)
    }

    /// Returns the raw slot value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> i16 {
        self.0
    }

    /// Returns the id as a `usize` for table access.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Initial sizing of a pool.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PoolSizing {
    /// Dense capacity.
    pub dense: usize,
    /// Recycled-slot capacity.
    pub recycled: usize,
    /// Sparse length (the world size).
    pub sparse: usize,
}

/// Untyped view of a component pool.
///
/// Used by reflection-driven code (serialization, debugging) that only knows
/// a component's run-time type token.
pub trait AnyPool {
    /// Returns the pool id.
    fn id(&self) -> PoolId;

    /// Returns the stored component's type token.
    fn meta(&self) -> ComponentMeta;

    /// Returns the number of entities owning a component in this pool.
    fn len(&self) -> usize;

    /// Checks if no entity owns a component in this pool.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if the entity owns a component in this pool.
    fn has(&self, entity: Entity) -> bool;

    /// Returns a type-erased copy of the entity's component.
    fn get_raw(&self, entity: Entity) -> Option<RawComponent>;

    /// Returns the owning entities in dense order.
    fn entities(&self) -> &[Entity];

    /// Returns the length of the sparse index.
    fn sparse_capacity(&self) -> usize;
}

/// Mutating half of the untyped pool interface, reserved for the world.
pub(crate) trait PoolStorage: AnyPool {
    fn as_pool(&self) -> &dyn AnyPool;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Grows the sparse index to `capacity` entities.
    fn resize(&mut self, capacity: usize);

    /// Gives the entity a freshly reset slot. `false` if it already has one.
    fn attach_slot(&mut self, entity: Entity) -> bool;

    /// Frees the entity's slot. `false` if it had none.
    fn detach_slot(&mut self, entity: Entity) -> bool;

    /// Overwrites the entity's value; hands the value back on type mismatch.
    fn write_raw(&mut self, entity: Entity, value: RawComponent) -> Result<(), RawComponent>;

    /// Copies `src`'s value into `dst`. Both must own a slot.
    fn copy_slot(&mut self, src: Entity, dst: Entity);
}

/// Dense storage for one component type.
///
/// Reads are exposed directly; structural changes go through the world so
/// raw entity slots and filters stay consistent.
pub struct ComponentPool<T: Component> {
    id: PoolId,
    /// Live values, packed.
    dense: Vec<T>,
    /// Owner of each dense slot.
    owners: Vec<Entity>,
    /// Reset values waiting to be reused.
    recycled: Vec<T>,
    /// Entity -> dense index + 1.
    sparse: Vec<u32>,
}

impl<T: Component> ComponentPool<T> {
    pub(crate) fn new(id: PoolId, sizing: PoolSizing) -> Self {
        Self {
            id,
            dense: Vec::with_capacity(sizing.dense),
            owners: Vec::with_capacity(sizing.dense),
            recycled: Vec::with_capacity(sizing.recycled),
            sparse: vec![0; sizing.sparse],
        }
    }

    /// Returns the pool id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Returns the number of stored components.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Checks if the pool stores no components.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Returns the number of reset values waiting to be reused.
    #[inline]
    #[must_use]
    pub fn recycled_count(&self) -> usize {
        self.recycled.len()
    }

    #[inline]
    fn slot(&self, entity: Entity) -> Option<usize> {
        match self.sparse.get(entity.index()) {
            Some(&slot) if slot > 0 => Some(slot as usize - 1),
            _ => None,
        }
    }

    /// Checks if the entity owns a component in this pool.
    #[inline]
    #[must_use]
    pub fn has(&self, entity: Entity) -> bool {
        self.slot(entity).is_some()
    }

    /// Gets the entity's component.
    ///
    /// # Panics
    ///
    /// Panics if the entity has no component in this pool.
    #[inline]
    #[must_use]
    pub fn get(&self, entity: Entity) -> &T {
        match self.slot(entity) {
            Some(slot) => &self.dense[slot],
            None => panic!("{}", self.missing(entity)),
        }
    }

    /// Gets the entity's component mutably.
    ///
    /// # Panics
    ///
    /// Panics if the entity has no component in this pool.
    #[inline]
    pub fn get_mut(&mut self, entity: Entity) -> &mut T {
        match self.slot(entity) {
            Some(slot) => &mut self.dense[slot],
            None => panic!("{}", self.missing(entity)),
        }
    }

    /// Gets the entity's component, if present.
    #[inline]
    #[must_use]
    pub fn try_get(&self, entity: Entity) -> Option<&T> {
        self.slot(entity).map(|slot| &self.dense[slot])
    }

    /// Gets the entity's component mutably, if present.
    #[inline]
    pub fn try_get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.slot(entity).map(|slot| &mut self.dense[slot])
    }

    /// Returns the owning entities in dense order.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.owners
    }

    /// Returns the stored values in dense order.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.dense
    }

    /// Returns the stored values mutably, in dense order.
    ///
    /// Values can be rewritten in place; ownership cannot change.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.dense
    }

    /// Iterates over `(entity, value)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.owners.iter().copied().zip(self.dense.iter())
    }

    fn missing(&self, entity: Entity) -> EcsError {
        EcsError::ComponentMissing {
            entity,
            component: std::any::type_name::<T>(),
        }
    }

    /// Gives the entity a slot and returns its dense index.
    pub(crate) fn attach(&mut self, entity: Entity) -> Option<usize> {
        if self.has(entity) {
            return None;
        }

        let value = self.recycled.pop().unwrap_or_else(|| {
            let mut value = T::default();
            value.auto_reset();
            value
        });
        let index = self.dense.len();
        self.dense.push(value);
        self.owners.push(entity);
        self.sparse[entity.index()] = index as u32 + 1;
        Some(index)
    }

    /// Swap-removes the entity's slot and keeps the reset value for reuse.
    pub(crate) fn detach(&mut self, entity: Entity) -> bool {
        let Some(index) = self.slot(entity) else {
            return false;
        };

        self.sparse[entity.index()] = 0;
        let mut value = self.dense.swap_remove(index);
        self.owners.swap_remove(index);
        if let Some(&moved) = self.owners.get(index) {
            self.sparse[moved.index()] = index as u32 + 1;
        }

        value.auto_reset();
        self.recycled.push(value);
        true
    }

    /// Mutable access by dense index, used right after `attach`.
    #[inline]
    pub(crate) fn at_mut(&mut self, index: usize) -> &mut T {
        &mut self.dense[index]
    }

    fn copy_between(&mut self, src: usize, dst: usize) {
        if src == dst {
            return;
        }
        if src < dst {
            let (head, tail) = self.dense.split_at_mut(dst);
            T::auto_copy(&head[src], &mut tail[0]);
        } else {
            let (head, tail) = self.dense.split_at_mut(src);
            T::auto_copy(&tail[0], &mut head[dst]);
        }
    }
}

impl<T: Component> AnyPool for ComponentPool<T> {
    fn id(&self) -> PoolId {
        self.id
    }

    fn meta(&self) -> ComponentMeta {
        ComponentMeta::of::<T>()
    }

    fn len(&self) -> usize {
        self.dense.len()
    }

    fn has(&self, entity: Entity) -> bool {
        self.slot(entity).is_some()
    }

    fn get_raw(&self, entity: Entity) -> Option<RawComponent> {
        self.try_get(entity).map(|value| RawComponent::new(value.clone()))
    }

    fn entities(&self) -> &[Entity] {
        &self.owners
    }

    fn sparse_capacity(&self) -> usize {
        self.sparse.len()
    }
}

impl<T: Component> PoolStorage for ComponentPool<T> {
    fn as_pool(&self) -> &dyn AnyPool {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn resize(&mut self, capacity: usize) {
        if capacity > self.sparse.len() {
            self.sparse.resize(capacity, 0);
        }
    }

    fn attach_slot(&mut self, entity: Entity) -> bool {
        self.attach(entity).is_some()
    }

    fn detach_slot(&mut self, entity: Entity) -> bool {
        self.detach(entity)
    }

    fn write_raw(&mut self, entity: Entity, value: RawComponent) -> Result<(), RawComponent> {
        let value = value.into_inner::<T>()?;
        if let Some(slot) = self.try_get_mut(entity) {
            *slot = value;
        }
        Ok(())
    }

    fn copy_slot(&mut self, src: Entity, dst: Entity) {
        if let (Some(src), Some(dst)) = (self.slot(src), self.slot(dst)) {
            self.copy_between(src, dst);
        }
    }
}

impl<T: Component + fmt::Debug> fmt::Debug for ComponentPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentPool")
            .field("id", &self.id)
            .field("len", &self.dense.len())
            .field("recycled", &self.recycled.len())
            .finish_non_exhaustive()
    }
}
