//! # ECS World
//!
//! The central container for entities, component pools and filters.
//!
//! The world owns every structure and keeps them consistent:
//!
//! ```text
//! spawn ──► EntityStore (raw i16 slots)
//!             │ attach/detach pool id
//! add/remove ─┼──► ComponentPool<T> (sparse set)
//!             └──► filters indexed by pool id ──► Filter membership
//! ```
//!
//! Nothing is pre-sized for the worst case: every buffer starts at the
//! [`WorldConfig`] size and doubles on demand. When the entity buffer grows,
//! every pool and filter sparse index grows with it.

use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;

use tracing::{debug, trace, warn};

use super::component::{Component, ComponentMeta, RawComponent};
use super::entity::{Entity, PackedEntity, PackedEntityWithWorld, WorldId};
use super::entity_store::{Allocation, EntityStore};
use super::events::{ListenerId, WorldEventListener};
use super::filter::Filter;
use super::mask::{Mask, MaskKey};
use super::pool::{AnyPool, ComponentPool, PoolId, PoolSizing, PoolStorage};
use crate::config::WorldConfig;
use crate::error::{sanitize_check, EcsError, EcsResult, SANITIZE};

/// The ECS world.
///
/// A world is single-threaded: filters are shared `Rc` handles, so `World`
/// is neither `Send` nor `Sync`.
///
/// # Example
///
/// ```rust
/// use tessera_core::{Component, World};
///
/// #[derive(Clone, Default, Debug, PartialEq)]
/// struct Position { x: f32, y: f32 }
/// impl Component for Position {}
///
/// #[derive(Clone, Default, Debug, PartialEq)]
/// struct Velocity { x: f32, y: f32 }
/// impl Component for Velocity {}
///
/// let mut world = World::new();
/// let moving = world.filter::<Position>().with::<Velocity>().build();
///
/// let entity = world.spawn();
/// world.insert(entity, Position { x: 0.0, y: 0.0 });
/// world.insert(entity, Velocity { x: 1.0, y: 2.0 });
///
/// for entity in &moving {
///     let velocity = world.get::<Velocity>(entity).clone();
///     let position = world.get_mut::<Position>(entity);
///     position.x += velocity.x;
///     position.y += velocity.y;
/// }
///
/// assert_eq!(world.get::<Position>(entity), &Position { x: 1.0, y: 2.0 });
/// ```
pub struct World {
    id: WorldId,
    config: WorldConfig,
    store: EntityStore,

    // =========================================================================
    // Pools
    // =========================================================================
    pools: Vec<Box<dyn PoolStorage>>,
    pool_ids: HashMap<TypeId, PoolId>,

    // =========================================================================
    // Filters
    // =========================================================================
    filters: HashMap<MaskKey, Filter>,
    /// Filters in creation order.
    all_filters: Vec<Filter>,
    /// Pool id -> filters that include it.
    filters_by_include: Vec<Vec<Filter>>,
    /// Pool id -> filters that exclude it.
    filters_by_exclude: Vec<Vec<Filter>>,
    /// Cleared buffers of masks that resolved to an existing filter.
    mask_buffers: Vec<(Vec<PoolId>, Vec<PoolId>)>,

    /// Entities spawned since the last leak check (checked builds only).
    leaked: Vec<Entity>,
    listeners: Vec<(ListenerId, Box<dyn WorldEventListener>)>,
    next_listener: u32,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates a world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Creates a world with the given configuration.
    ///
    /// Zero fields fall back to their defaults.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        let config = config.resolved();
        let world = Self {
            id: WorldId::next(),
            config,
            store: EntityStore::new(
                config.entities,
                config.recycled_entities,
                config.entity_components_size,
            ),
            pools: Vec::with_capacity(config.pools),
            pool_ids: HashMap::with_capacity(config.pools),
            filters: HashMap::with_capacity(config.filters),
            all_filters: Vec::with_capacity(config.filters),
            filters_by_include: Vec::with_capacity(config.pools),
            filters_by_exclude: Vec::with_capacity(config.pools),
            mask_buffers: Vec::new(),
            leaked: Vec::new(),
            listeners: Vec::new(),
            next_listener: 0,
        };
        debug!(
            world = ?world.id,
            entities = config.entities,
            pools = config.pools,
            "world created"
        );
        world
    }

    /// Returns the identity of this world.
    #[inline]
    #[must_use]
    pub fn id(&self) -> WorldId {
        self.id
    }

    /// Returns the resolved configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Tears the world down.
    ///
    /// Every entity owning components is despawned (so live filters end up
    /// empty), then listeners are told the world is gone.
    ///
    /// # Errors
    ///
    /// In checked builds, returns [`EcsError::LeakedEntities`] if an entity
    /// was spawned and left without components.
    pub fn destroy(mut self) -> EcsResult<()> {
        self.check_for_leaked_entities()?;

        for index in (0..self.store.used_count()).rev() {
            let entity = Entity::from_raw(index as u32);
            if self.store.components_count(entity) > 0 {
                self.despawn(entity);
            }
        }

        self.pools.clear();
        self.pool_ids.clear();
        self.filters.clear();
        self.all_filters.clear();
        self.filters_by_include.clear();
        self.filters_by_exclude.clear();
        for (_, listener) in self.listeners.iter_mut().rev() {
            listener.on_world_destroyed();
        }
        debug!(world = ?self.id, "world destroyed");
        Ok(())
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Spawns a new entity, recycling a destroyed slot when one is free.
    ///
    /// An entity left without components is a leak; give it at least one
    /// component before the next leak check.
    pub fn spawn(&mut self) -> Entity {
        let Allocation { entity, resized } = self.store.allocate();
        if let Some(world_size) = resized {
            self.grow(world_size);
        }
        if SANITIZE {
            self.leaked.push(entity);
        }
        trace!(%entity, gen = self.store.gen(entity), "spawn");
        for (_, listener) in &mut self.listeners {
            listener.on_entity_created(entity);
        }
        entity
    }

    /// Destroys an entity and all of its components.
    ///
    /// No-op if the entity is already dead.
    ///
    /// # Panics
    ///
    /// In checked builds, panics if the entity was never spawned.
    pub fn despawn(&mut self, entity: Entity) {
        sanitize_check!(
            self.store.in_range(entity),
            EcsError::EntityOutOfRange(entity)
        );
        if !self.store.is_alive(entity) {
            return;
        }

        if self.store.components_count(entity) == 0 {
            self.untrack_leak(entity);
            self.recycle(entity);
            return;
        }

        // The last removal recycles the slot.
        loop {
            let Some(pool) = self.store.component_ids(entity).next_back() else {
                break;
            };
            self.remove_by_id(entity, pool);
        }
    }

    /// Stops tracking a spawned entity as a possible leak.
    fn untrack_leak(&mut self, entity: Entity) {
        if SANITIZE {
            if let Some(index) = self.leaked.iter().rposition(|&e| e == entity) {
                self.leaked.swap_remove(index);
            }
        }
    }

    fn recycle(&mut self, entity: Entity) {
        if self.store.recycle(entity) {
            trace!(%entity, "despawn");
            for (_, listener) in &mut self.listeners {
                listener.on_entity_destroyed(entity);
            }
        }
    }

    fn grow(&mut self, world_size: usize) {
        debug!(world = ?self.id, world_size, "entity buffer grown");
        for pool in &mut self.pools {
            pool.resize(world_size);
        }
        for filter in &self.all_filters {
            filter.resize(world_size);
        }
        for (_, listener) in &mut self.listeners {
            listener.on_world_resized(world_size);
        }
    }

    /// Checks if the entity slot is in use and alive.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.store.is_alive(entity)
    }

    /// Returns the entity's generation (negative once destroyed, 0 if the
    /// slot was never used).
    #[inline]
    #[must_use]
    pub fn entity_gen(&self, entity: Entity) -> i16 {
        self.store.gen(entity)
    }

    /// Returns the number of components the entity owns.
    #[inline]
    #[must_use]
    pub fn component_count(&self, entity: Entity) -> usize {
        self.store.components_count(entity)
    }

    /// Packs an entity with its current generation.
    #[inline]
    #[must_use]
    pub fn pack(&self, entity: Entity) -> PackedEntity {
        PackedEntity {
            id: entity,
            gen: self.store.gen(entity),
        }
    }

    /// Packs an entity with its current generation and this world's id.
    #[inline]
    #[must_use]
    pub fn pack_with_world(&self, entity: Entity) -> PackedEntityWithWorld {
        PackedEntityWithWorld {
            id: entity,
            gen: self.store.gen(entity),
            world: self.id,
        }
    }

    /// Runs the leak check.
    ///
    /// A leak is an entity that is still alive without any component. Only
    /// tracked in checked builds; otherwise always `Ok`. Leaks stay tracked
    /// until they are fixed, so every later check (including the one in
    /// [`destroy`](Self::destroy)) reports them again.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::LeakedEntities`] with the number of leaks found.
    pub fn check_for_leaked_entities(&mut self) -> EcsResult<()> {
        let store = &self.store;
        self.leaked
            .retain(|&entity| store.is_alive(entity) && store.components_count(entity) == 0);
        let leaks = self.leaked.len();

        if leaks > 0 {
            warn!(world = ?self.id, leaks, "empty entities detected");
            return Err(EcsError::LeakedEntities(leaks));
        }
        Ok(())
    }

    fn check_alive(&self, entity: Entity) {
        sanitize_check!(
            self.store.in_range(entity),
            EcsError::EntityOutOfRange(entity)
        );
        sanitize_check!(
            self.store.is_alive(entity),
            EcsError::EntityNotAlive(entity)
        );
    }

    // =========================================================================
    // Pools
    // =========================================================================

    /// Returns a typed handle to the pool of `T`, creating it on first use.
    ///
    /// # Panics
    ///
    /// Panics if the pool table is full.
    pub fn pool<T: Component>(&mut self) -> PoolMut<'_, T> {
        let id = self.pool_id::<T>();
        PoolMut {
            world: self,
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the id of the pool of `T`, creating it on first use.
    ///
    /// # Panics
    ///
    /// Panics if the pool table is full.
    pub fn pool_id<T: Component>(&mut self) -> PoolId {
        match self.try_pool_id::<T>() {
            Ok(id) => id,
            Err(err) => panic!("{err}"),
        }
    }

    /// Returns the id of the pool of `T`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::PoolTableFull`] if no pool id is left.
    pub fn try_pool_id<T: Component>(&mut self) -> EcsResult<PoolId> {
        self.register_pool(ComponentMeta::of::<T>())
    }

    pub(crate) fn register_pool(&mut self, meta: ComponentMeta) -> EcsResult<PoolId> {
        if let Some(&id) = self.pool_ids.get(&meta.type_id()) {
            return Ok(id);
        }
        if self.pools.len() >= PoolId::MAX_POOLS {
            return Err(EcsError::PoolTableFull(self.pools.len()));
        }

        let id = PoolId::from_raw(self.pools.len() as i16);
        let sizing = PoolSizing {
            dense: self.config.pool_dense_size,
            recycled: self.config.pool_recycled_size,
            sparse: self.store.world_size(),
        };
        self.pools.push(meta.new_pool(id, sizing));
        self.pool_ids.insert(meta.type_id(), id);
        self.filters_by_include.push(Vec::new());
        self.filters_by_exclude.push(Vec::new());
        debug!(world = ?self.id, %id, component = meta.short_name(), "pool registered");
        Ok(id)
    }

    /// Returns the pool of `T`, if it exists.
    #[must_use]
    pub fn component_pool<T: Component>(&self) -> Option<&ComponentPool<T>> {
        let id = self.pool_ids.get(&TypeId::of::<T>())?;
        self.pools[id.index()].as_any().downcast_ref()
    }

    fn component_pool_mut<T: Component>(&mut self) -> Option<&mut ComponentPool<T>> {
        let id = self.pool_ids.get(&TypeId::of::<T>())?;
        self.pools[id.index()].as_any_mut().downcast_mut()
    }

    fn typed_pool<T: Component>(&self, id: PoolId) -> &ComponentPool<T> {
        match self.pools[id.index()].as_any().downcast_ref() {
            Some(pool) => pool,
            None => unreachable!("pool {id} does not store {}", std::any::type_name::<T>()),
        }
    }

    fn typed_pool_mut<T: Component>(&mut self, id: PoolId) -> &mut ComponentPool<T> {
        match self.pools[id.index()].as_any_mut().downcast_mut() {
            Some(pool) => pool,
            None => unreachable!("pool {id} does not store {}", std::any::type_name::<T>()),
        }
    }

    /// Returns a pool by id.
    #[must_use]
    pub fn pool_by_id(&self, id: PoolId) -> Option<&dyn AnyPool> {
        self.pools.get(id.index()).map(|pool| pool.as_pool())
    }

    /// Returns a pool by component type.
    #[must_use]
    pub fn pool_by_type(&self, type_id: TypeId) -> Option<&dyn AnyPool> {
        let id = self.pool_ids.get(&type_id)?;
        self.pool_by_id(*id)
    }

    /// Iterates over every pool in id order.
    pub fn pools(&self) -> impl Iterator<Item = &dyn AnyPool> {
        self.pools.iter().map(|pool| pool.as_pool())
    }

    /// Returns the number of registered pools.
    #[inline]
    #[must_use]
    pub fn pools_count(&self) -> usize {
        self.pools.len()
    }

    // =========================================================================
    // Typed components
    // =========================================================================

    /// Adds a reset `T` to the entity and returns it.
    ///
    /// # Panics
    ///
    /// In checked builds, panics if the entity is dead or already owns a `T`.
    pub fn add<T: Component>(&mut self, entity: Entity) -> &mut T {
        self.check_alive(entity);
        let id = self.pool_id::<T>();
        let Some(index) = self.typed_pool_mut::<T>(id).attach(entity) else {
            sanitize_check!(
                false,
                EcsError::ComponentAlreadyPresent {
                    entity,
                    component: std::any::type_name::<T>(),
                }
            );
            return self.typed_pool_mut::<T>(id).get_mut(entity);
        };
        self.on_attached(entity, id);
        self.typed_pool_mut::<T>(id).at_mut(index)
    }

    /// Adds `value` to the entity and returns it.
    ///
    /// # Panics
    ///
    /// In checked builds, panics if the entity is dead or already owns a `T`.
    pub fn insert<T: Component>(&mut self, entity: Entity, value: T) -> &mut T {
        let slot = self.add::<T>(entity);
        *slot = value;
        slot
    }

    /// Gets the entity's `T`.
    ///
    /// # Panics
    ///
    /// Panics if the entity does not own a `T`.
    #[must_use]
    pub fn get<T: Component>(&self, entity: Entity) -> &T {
        self.check_alive(entity);
        match self.component_pool::<T>() {
            Some(pool) => pool.get(entity),
            None => panic!("{}", missing::<T>(entity)),
        }
    }

    /// Gets the entity's `T` mutably.
    ///
    /// # Panics
    ///
    /// Panics if the entity does not own a `T`.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> &mut T {
        self.check_alive(entity);
        match self.component_pool_mut::<T>() {
            Some(pool) => pool.get_mut(entity),
            None => panic!("{}", missing::<T>(entity)),
        }
    }

    /// Gets the entity's `T`, if it owns one.
    #[must_use]
    pub fn try_get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.component_pool::<T>()?.try_get(entity)
    }

    /// Gets the entity's `T` mutably, if it owns one.
    pub fn try_get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.component_pool_mut::<T>()?.try_get_mut(entity)
    }

    /// Gets the entity's `T`, adding a reset one first if missing.
    pub fn get_or_add<T: Component>(&mut self, entity: Entity) -> &mut T {
        if self.has::<T>(entity) {
            self.get_mut::<T>(entity)
        } else {
            self.add::<T>(entity)
        }
    }

    /// Checks if the entity owns a `T`.
    #[must_use]
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.component_pool::<T>()
            .is_some_and(|pool| pool.has(entity))
    }

    /// Removes the entity's `T`. No-op if it has none.
    ///
    /// Removing the last component destroys the entity.
    pub fn remove<T: Component>(&mut self, entity: Entity) {
        self.check_alive(entity);
        if let Some(&id) = self.pool_ids.get(&TypeId::of::<T>()) {
            self.remove_by_id(entity, id);
        }
    }

    /// Copies `src`'s `T` into `dst`, adding one to `dst` first if missing.
    ///
    /// Uses [`Component::auto_copy`].
    ///
    /// # Panics
    ///
    /// In checked builds, panics if either entity is dead or `src` has no
    /// `T`.
    pub fn copy<T: Component>(&mut self, src: Entity, dst: Entity) {
        self.check_alive(src);
        self.check_alive(dst);
        let id = self.pool_id::<T>();
        self.copy_by_id(src, dst, id);
    }

    /// Copies every component of `src` onto `dst`.
    pub fn copy_entity(&mut self, src: Entity, dst: Entity) {
        self.check_alive(src);
        self.check_alive(dst);
        let ids: Vec<PoolId> = self.store.component_ids(src).collect();
        for id in ids {
            self.copy_by_id(src, dst, id);
        }
    }

    fn copy_by_id(&mut self, src: Entity, dst: Entity, id: PoolId) {
        let has_src = self.pools[id.index()].has(src);
        sanitize_check!(
            has_src,
            EcsError::ComponentMissing {
                entity: src,
                component: self.pools[id.index()].meta().type_name(),
            }
        );
        if !has_src || src == dst {
            return;
        }
        if self.pools[id.index()].attach_slot(dst) {
            self.on_attached(dst, id);
        }
        self.pools[id.index()].copy_slot(src, dst);
    }

    // =========================================================================
    // Untyped components
    // =========================================================================

    fn check_pool(&self, id: PoolId, value: &RawComponent) -> EcsResult<()> {
        let pool = self
            .pools
            .get(id.index())
            .ok_or_else(|| EcsError::UnknownComponent(format!("pool {id}")))?;
        let meta = pool.meta();
        if meta.type_id() != value.type_id() {
            return Err(EcsError::ComponentTypeMismatch {
                pool: id,
                expected: meta.type_name(),
            });
        }
        Ok(())
    }

    fn write_raw(&mut self, id: PoolId, entity: Entity, value: RawComponent) -> EcsResult<()> {
        let expected = self.pools[id.index()].meta().type_name();
        self.pools[id.index()]
            .write_raw(entity, value)
            .map_err(|_| EcsError::ComponentTypeMismatch { pool: id, expected })
    }

    /// Adds a type-erased component to the entity.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnknownComponent`] if the pool does not exist.
    /// - [`EcsError::ComponentTypeMismatch`] if the value has another type.
    /// - [`EcsError::EntityNotAlive`] if the entity is dead.
    /// - [`EcsError::ComponentAlreadyPresent`] if the entity already owns one.
    pub fn add_raw(&mut self, entity: Entity, id: PoolId, value: RawComponent) -> EcsResult<()> {
        self.check_pool(id, &value)?;
        if !self.store.is_alive(entity) {
            return Err(EcsError::EntityNotAlive(entity));
        }
        if !self.pools[id.index()].attach_slot(entity) {
            return Err(EcsError::ComponentAlreadyPresent {
                entity,
                component: value.meta().type_name(),
            });
        }
        self.on_attached(entity, id);
        self.write_raw(id, entity, value)
    }

    /// Writes a type-erased component, adding it if the entity has none.
    ///
    /// # Errors
    ///
    /// Same as [`add_raw`](Self::add_raw), minus the already-present case.
    pub fn set_raw(&mut self, entity: Entity, id: PoolId, value: RawComponent) -> EcsResult<()> {
        self.check_pool(id, &value)?;
        if !self.store.is_alive(entity) {
            return Err(EcsError::EntityNotAlive(entity));
        }
        if self.pools[id.index()].attach_slot(entity) {
            self.on_attached(entity, id);
        }
        self.write_raw(id, entity, value)
    }

    /// Writes a type-erased component by its own type, creating the pool if
    /// needed.
    ///
    /// # Errors
    ///
    /// [`EcsError::PoolTableFull`] if the pool cannot be created, otherwise
    /// same as [`set_raw`](Self::set_raw).
    pub fn set_raw_by_type(&mut self, entity: Entity, value: RawComponent) -> EcsResult<PoolId> {
        let id = self.register_pool(value.meta())?;
        self.set_raw(entity, id, value)?;
        Ok(id)
    }

    /// Removes a component by pool id. No-op if the entity has none.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponent`] if the pool does not exist,
    /// [`EcsError::EntityNotAlive`] if the entity is dead.
    pub fn remove_raw(&mut self, entity: Entity, id: PoolId) -> EcsResult<()> {
        if id.index() >= self.pools.len() {
            return Err(EcsError::UnknownComponent(format!("pool {id}")));
        }
        if !self.store.is_alive(entity) {
            return Err(EcsError::EntityNotAlive(entity));
        }
        self.remove_by_id(entity, id);
        Ok(())
    }

    /// Removes a component by type. No-op if the entity has none.
    ///
    /// # Errors
    ///
    /// Same as [`remove_raw`](Self::remove_raw).
    pub fn remove_raw_by_type(&mut self, entity: Entity, type_id: TypeId) -> EcsResult<()> {
        let id = *self
            .pool_ids
            .get(&type_id)
            .ok_or_else(|| EcsError::UnknownComponent(format!("{type_id:?}")))?;
        self.remove_raw(entity, id)
    }

    // =========================================================================
    // Change propagation
    // =========================================================================

    /// Bookkeeping after a pool gave `entity` a slot.
    fn on_attached(&mut self, entity: Entity, id: PoolId) {
        if let Some(capacity) = self.store.attach(entity, id) {
            debug!(world = ?self.id, capacity, "entity component capacity grown");
        }
        if self.store.components_count(entity) == 1 {
            self.untrack_leak(entity);
        }
        self.on_component_change(entity, id, true);
    }

    /// Removes the entity's slot in pool `id`, recycling the entity if that
    /// was its last component.
    fn remove_by_id(&mut self, entity: Entity, id: PoolId) -> bool {
        if !self.pools[id.index()].has(entity) {
            return false;
        }
        // Filters are updated while the component still exists.
        self.on_component_change(entity, id, false);
        self.pools[id.index()].detach_slot(entity);
        if self.store.detach(entity, id) == 0 {
            self.recycle(entity);
        }
        true
    }

    fn on_component_change(&mut self, entity: Entity, id: PoolId, added: bool) {
        for filter in &self.filters_by_include[id.index()] {
            if self.is_mask_compatible(filter.mask(), entity) {
                if added {
                    filter.add_entity(entity);
                } else {
                    filter.remove_entity(entity);
                }
            }
        }
        for filter in &self.filters_by_exclude[id.index()] {
            if self.is_mask_compatible_without(filter.mask(), entity, id) {
                if added {
                    filter.remove_entity(entity);
                } else {
                    filter.add_entity(entity);
                }
            }
        }
        for (_, listener) in &mut self.listeners {
            listener.on_entity_changed(entity, id, added);
        }
    }

    fn is_mask_compatible(&self, mask: &MaskKey, entity: Entity) -> bool {
        mask.include()
            .iter()
            .all(|id| self.pools[id.index()].has(entity))
            && !mask
                .exclude()
                .iter()
                .any(|id| self.pools[id.index()].has(entity))
    }

    fn is_mask_compatible_without(&self, mask: &MaskKey, entity: Entity, skip: PoolId) -> bool {
        mask.include()
            .iter()
            .all(|&id| id != skip && self.pools[id.index()].has(entity))
            && !mask
                .exclude()
                .iter()
                .any(|&id| id != skip && self.pools[id.index()].has(entity))
    }

    // =========================================================================
    // Filters
    // =========================================================================

    /// Starts a mask that includes `T`.
    ///
    /// # Panics
    ///
    /// Panics if the pool table is full.
    pub fn filter<T: Component>(&mut self) -> Mask<'_> {
        let id = self.pool_id::<T>();
        Mask::new(self, id)
    }

    pub(crate) fn take_mask_buffers(&mut self) -> (Vec<PoolId>, Vec<PoolId>) {
        self.mask_buffers
            .pop()
            .unwrap_or_else(|| (Vec::with_capacity(8), Vec::with_capacity(2)))
    }

    pub(crate) fn resolve_filter(&mut self, mask: MaskKey, capacity: usize) -> Filter {
        if let Some(filter) = self.filters.get(&mask) {
            let filter = filter.clone();
            self.mask_buffers.push(mask.into_buffers());
            return filter;
        }

        let filter = Filter::new(mask.clone(), capacity, self.store.world_size());
        for id in mask.include() {
            self.filters_by_include[id.index()].push(filter.clone());
        }
        for id in mask.exclude() {
            self.filters_by_exclude[id.index()].push(filter.clone());
        }

        for index in 0..self.store.used_count() {
            let entity = Entity::from_raw(index as u32);
            if self.store.components_count(entity) > 0 && self.is_mask_compatible(&mask, entity) {
                filter.add_entity(entity);
            }
        }

        debug!(
            world = ?self.id,
            include = mask.include().len(),
            exclude = mask.exclude().len(),
            matched = filter.len(),
            "filter created"
        );
        self.filters.insert(mask, filter.clone());
        self.all_filters.push(filter.clone());
        for (_, listener) in &mut self.listeners {
            listener.on_filter_created(&filter);
        }
        filter
    }

    /// Returns the number of distinct filters.
    #[inline]
    #[must_use]
    pub fn filters_count(&self) -> usize {
        self.all_filters.len()
    }

    /// Returns every filter in creation order.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.all_filters
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Returns a copy of every component the entity owns.
    #[must_use]
    pub fn components(&self, entity: Entity) -> Vec<RawComponent> {
        self.store
            .component_ids(entity)
            .filter_map(|id| self.pools[id.index()].get_raw(entity))
            .collect()
    }

    /// Returns the type tokens of every component the entity owns.
    #[must_use]
    pub fn component_types(&self, entity: Entity) -> Vec<ComponentMeta> {
        self.store
            .component_ids(entity)
            .map(|id| self.pools[id.index()].meta())
            .collect()
    }

    /// Returns the number of alive entities.
    #[inline]
    #[must_use]
    pub fn entities_count(&self) -> usize {
        self.store.alive_count()
    }

    /// Returns the number of slots ever handed out (alive or recycled).
    #[inline]
    #[must_use]
    pub fn used_entities_count(&self) -> usize {
        self.store.used_count()
    }

    /// Returns the number of slots the entity buffer can hold.
    #[inline]
    #[must_use]
    pub fn world_size(&self) -> usize {
        self.store.world_size()
    }

    /// Returns the raw entity buffer.
    ///
    /// See [`raw_offsets`](super::raw_offsets) for the slot layout.
    #[inline]
    #[must_use]
    pub fn raw_entities(&self) -> &[i16] {
        self.store.raw()
    }

    /// Returns the raw entity buffer as native-endian bytes.
    #[inline]
    #[must_use]
    pub fn raw_entities_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.store.raw())
    }

    /// Returns the length of one raw entity slot, in `i16` values.
    #[inline]
    #[must_use]
    pub fn raw_entity_item_size(&self) -> usize {
        self.store.item_size()
    }

    /// Returns every alive entity in slot order.
    #[must_use]
    pub fn all_entities(&self) -> Vec<Entity> {
        (0..self.store.used_count())
            .map(|index| Entity::from_raw(index as u32))
            .filter(|&entity| self.store.is_alive(entity))
            .collect()
    }

    /// Formats a packed entity for debugging.
    ///
    /// `Entity-Null`, `Entity-NonAlive`, or `Entity-{id}:{gen} [A,B]`.
    #[must_use]
    pub fn describe(&self, packed: &PackedEntity) -> String {
        if packed.is_null() {
            return String::from("Entity-Null");
        }
        let Some(entity) = packed.unpack(self) else {
            return String::from("Entity-NonAlive");
        };

        let mut types = String::new();
        for meta in self.component_types(entity) {
            if !types.is_empty() {
                types.push(',');
            }
            types.push_str(meta.short_name());
        }
        format!("Entity-{}:{} [{}]", packed.id, packed.gen, types)
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Registers a world event listener.
    pub fn add_listener(&mut self, listener: Box<dyn WorldEventListener>) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Unregisters a listener and hands it back.
    pub fn remove_listener(&mut self, id: ListenerId) -> Option<Box<dyn WorldEventListener>> {
        let index = self.listeners.iter().position(|(other, _)| *other == id)?;
        Some(self.listeners.remove(index).1)
    }
}

fn missing<T: Component>(entity: Entity) -> EcsError {
    EcsError::ComponentMissing {
        entity,
        component: std::any::type_name::<T>(),
    }
}

/// Typed handle to one component pool, borrowed from a [`World`].
///
/// Every structural change still goes through the world, so filters and
/// raw entity slots stay in sync.
pub struct PoolMut<'w, T: Component> {
    world: &'w mut World,
    id: PoolId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> PoolMut<'_, T> {
    /// Returns the pool id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Returns the underlying storage for reads.
    #[must_use]
    pub fn storage(&self) -> &ComponentPool<T> {
        self.world.typed_pool::<T>(self.id)
    }

    /// Returns the number of stored components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage().len()
    }

    /// Checks if the pool stores no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage().is_empty()
    }

    /// See [`World::add`].
    pub fn add(&mut self, entity: Entity) -> &mut T {
        self.world.add::<T>(entity)
    }

    /// See [`World::insert`].
    pub fn insert(&mut self, entity: Entity, value: T) -> &mut T {
        self.world.insert(entity, value)
    }

    /// See [`World::get`].
    #[must_use]
    pub fn get(&self, entity: Entity) -> &T {
        self.world.get::<T>(entity)
    }

    /// See [`World::get_mut`].
    pub fn get_mut(&mut self, entity: Entity) -> &mut T {
        self.world.get_mut::<T>(entity)
    }

    /// See [`World::try_get`].
    #[must_use]
    pub fn try_get(&self, entity: Entity) -> Option<&T> {
        self.world.try_get::<T>(entity)
    }

    /// See [`World::get_or_add`].
    pub fn get_or_add(&mut self, entity: Entity) -> &mut T {
        self.world.get_or_add::<T>(entity)
    }

    /// See [`World::has`].
    #[must_use]
    pub fn has(&self, entity: Entity) -> bool {
        self.storage().has(entity)
    }

    /// See [`World::remove`].
    pub fn remove(&mut self, entity: Entity) {
        self.world.remove::<T>(entity);
    }

    /// See [`World::copy`].
    pub fn copy(&mut self, src: Entity, dst: Entity) {
        self.world.copy::<T>(src, dst);
    }

    /// Returns the owning entities in dense order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        self.storage().entities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::raw_offsets;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Velocity {
        x: f32,
        y: f32,
    }
    impl Component for Velocity {}

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Frozen;
    impl Component for Frozen {}

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Health(u32);
    impl Component for Health {
        fn auto_reset(&mut self) {
            self.0 = 100;
        }
    }

    #[test]
    fn test_spawn_and_despawn() {
        let mut world = World::new();
        let e = world.spawn();
        world.add::<Position>(e);
        assert!(world.is_alive(e));
        assert_eq!(world.entities_count(), 1);

        world.despawn(e);
        assert!(!world.is_alive(e));
        assert_eq!(world.entities_count(), 0);
        assert_eq!(world.entity_gen(e), -2);

        // Despawning twice is a no-op.
        world.despawn(e);
        assert_eq!(world.entities_count(), 0);
    }

    #[test]
    fn test_same_type_same_pool() {
        let mut world = World::new();
        let a = world.pool_id::<Position>();
        let b = world.pool::<Position>().id();
        let c = world.pool_id::<Velocity>();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(world.pools_count(), 2);
    }

    #[test]
    fn test_add_get_remove() {
        let mut world = World::new();
        let e = world.spawn();
        world.insert(e, Position { x: 1.0, y: 2.0 });
        world.add::<Velocity>(e);
        assert!(world.has::<Position>(e));
        assert_eq!(world.get::<Position>(e), &Position { x: 1.0, y: 2.0 });
        assert_eq!(world.component_count(e), 2);

        world.remove::<Position>(e);
        assert!(!world.has::<Position>(e));
        assert!(world.try_get::<Position>(e).is_none());
        assert!(world.is_alive(e));
    }

    #[test]
    fn test_removing_last_component_destroys_entity() {
        let mut world = World::new();
        let e = world.spawn();
        world.add::<Position>(e);
        world.remove::<Position>(e);
        assert!(!world.is_alive(e));
    }

    #[test]
    fn test_auto_reset_applies_on_add() {
        let mut world = World::new();
        let e = world.spawn();
        assert_eq!(world.add::<Health>(e), &Health(100));
        world.get_mut::<Health>(e).0 = 5;
        world.add::<Position>(e);
        world.remove::<Health>(e);
        assert_eq!(world.get_or_add::<Health>(e), &Health(100));
    }

    #[test]
    fn test_copy_adds_missing_component() {
        let mut world = World::new();
        let src = world.spawn();
        let dst = world.spawn();
        world.insert(src, Velocity { x: 3.0, y: 4.0 });
        world.add::<Position>(dst);

        world.copy::<Velocity>(src, dst);
        assert_eq!(world.get::<Velocity>(dst), world.get::<Velocity>(src));
    }

    #[test]
    fn test_copy_entity() {
        let mut world = World::new();
        let src = world.spawn();
        world.insert(src, Position { x: 1.0, y: 1.0 });
        world.insert(src, Velocity { x: 2.0, y: 2.0 });
        let dst = world.spawn();
        world.add::<Frozen>(dst);

        world.copy_entity(src, dst);
        assert_eq!(world.component_count(dst), 3);
        assert_eq!(world.get::<Velocity>(dst), &Velocity { x: 2.0, y: 2.0 });
    }

    #[test]
    fn test_filter_tracks_membership() {
        let mut world = World::new();
        let filter = world
            .filter::<Position>()
            .with::<Velocity>()
            .without::<Frozen>()
            .build();

        let e = world.spawn();
        world.add::<Position>(e);
        assert!(!filter.contains(e));
        world.add::<Velocity>(e);
        assert!(filter.contains(e));
        world.add::<Frozen>(e);
        assert!(!filter.contains(e));
        world.remove::<Frozen>(e);
        assert!(filter.contains(e));
        world.remove::<Position>(e);
        assert!(!filter.contains(e));
    }

    #[test]
    fn test_same_mask_same_filter() {
        let mut world = World::new();
        let a = world.filter::<Position>().with::<Velocity>().build();
        let b = world.filter::<Velocity>().with::<Position>().build();
        assert!(a.ptr_eq(&b));
        // `b` resolved to `a`, so its buffers went back to the free list.
        assert_eq!(world.mask_buffers.len(), 1);
        let pooled = world.mask_buffers[0].0.as_ptr();

        let c = world.filter::<Position>().build();
        assert!(!a.ptr_eq(&c));
        assert!(world.mask_buffers.is_empty());
        // The table key of the new filter owns the pooled include buffer.
        assert!(world
            .filters
            .keys()
            .any(|key| key.include() == c.mask().include() && key.include().as_ptr() == pooled));
        assert_eq!(world.filters_count(), 2);
    }

    #[test]
    fn test_filter_built_late_sees_existing_entities() {
        let mut world = World::new();
        let a = world.spawn();
        world.add::<Position>(a);
        let b = world.spawn();
        world.add::<Position>(b);
        world.add::<Frozen>(b);

        let filter = world.filter::<Position>().without::<Frozen>().build();
        assert_eq!(&*filter.entities(), &[a]);
    }

    #[test]
    fn test_mutation_while_iterating() {
        let mut world = World::new();
        let filter = world.filter::<Position>().build();
        let entities: Vec<Entity> = (0..4)
            .map(|_| {
                let e = world.spawn();
                world.add::<Position>(e);
                e
            })
            .collect();

        let mut seen = Vec::new();
        for e in &filter {
            world.add::<Velocity>(e);
            world.remove::<Position>(e);
            seen.push(e);
        }

        assert_eq!(seen, entities);
        assert!(filter.is_empty());
    }

    #[test]
    fn test_growth_cascades_to_pools_and_filters() {
        let mut world = World::with_config(WorldConfig::with_entities(2));
        let filter = world.filter::<Position>().build();
        let entities: Vec<Entity> = (0..5)
            .map(|i| {
                let e = world.spawn();
                world.insert(e, Position { x: i as f32, y: 0.0 });
                e
            })
            .collect();

        assert!(world.world_size() >= 5);
        assert_eq!(filter.len(), 5);
        assert_eq!(filter.sparse_index().len(), world.world_size());
        for (i, &e) in entities.iter().enumerate() {
            assert_eq!(world.get::<Position>(e).x, i as f32);
        }
    }

    #[test]
    fn test_component_capacity_growth() {
        let mut world = World::with_config(WorldConfig {
            entity_components_size: 1,
            ..WorldConfig::default()
        });
        let e = world.spawn();
        world.add::<Position>(e);
        world.add::<Velocity>(e);
        world.add::<Frozen>(e);
        assert_eq!(world.component_count(e), 3);
        assert!(world.raw_entity_item_size() >= 5);
        assert_eq!(world.component_types(e).len(), 3);
    }

    #[test]
    fn test_raw_access() {
        let mut world = World::new();
        let e = world.spawn();
        let id = world
            .set_raw_by_type(e, RawComponent::new(Position { x: 9.0, y: 9.0 }))
            .unwrap();
        assert_eq!(world.get::<Position>(e).x, 9.0);

        let err = world
            .add_raw(e, id, RawComponent::new(Position::default()))
            .unwrap_err();
        assert!(matches!(err, EcsError::ComponentAlreadyPresent { .. }));

        let err = world
            .set_raw(e, id, RawComponent::new(Velocity::default()))
            .unwrap_err();
        assert!(matches!(err, EcsError::ComponentTypeMismatch { .. }));

        world.set_raw(e, id, RawComponent::new(Position { x: 1.0, y: 0.0 })).unwrap();
        assert_eq!(world.get::<Position>(e).x, 1.0);

        let raw = world.components(e);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].downcast_ref::<Position>().unwrap().x, 1.0);

        world.remove_raw(e, id).unwrap();
        assert!(!world.is_alive(e));
        assert!(world.remove_raw(e, PoolId::from_raw(40)).is_err());
    }

    #[test]
    fn test_raw_bytes_view() {
        let mut world = World::with_config(WorldConfig::with_entities(4));
        let e = world.spawn();
        world.add::<Position>(e);
        let bytes = world.raw_entities_bytes();
        assert_eq!(bytes.len(), world.raw_entities().len() * 2);
        assert_eq!(world.raw_entities()[raw_offsets::GEN], 1);
    }

    #[test]
    fn test_describe() {
        let mut world = World::new();
        let e = world.spawn();
        world.add::<Position>(e);
        world.add::<Velocity>(e);
        let packed = world.pack(e);
        assert_eq!(world.describe(&packed), "Entity-0:1 [Position,Velocity]");
        assert_eq!(world.describe(&PackedEntity::NULL), "Entity-Null");
        world.despawn(e);
        assert_eq!(world.describe(&packed), "Entity-NonAlive");
    }

    #[test]
    fn test_pack_with_world() {
        let mut world = World::new();
        let other = World::new();
        let e = world.spawn();
        world.add::<Position>(e);
        let packed = world.pack_with_world(e);
        assert_eq!(packed.unpack(&world), Some(e));
        assert_eq!(packed.unpack(&other), None);
    }

    #[test]
    fn test_all_entities_skips_dead() {
        let mut world = World::new();
        let a = world.spawn();
        let b = world.spawn();
        let c = world.spawn();
        for e in [a, b, c] {
            world.add::<Position>(e);
        }
        world.despawn(b);
        assert_eq!(world.all_entities(), vec![a, c]);
        assert_eq!(world.used_entities_count(), 3);
    }

    #[derive(Default)]
    struct Counter(Rc<RefCell<Vec<&'static str>>>);

    impl WorldEventListener for Counter {
        fn on_entity_created(&mut self, _entity: Entity) {
            self.0.borrow_mut().push("created");
        }
        fn on_entity_destroyed(&mut self, _entity: Entity) {
            self.0.borrow_mut().push("destroyed");
        }
        fn on_filter_created(&mut self, _filter: &Filter) {
            self.0.borrow_mut().push("filter");
        }
        fn on_world_destroyed(&mut self) {
            self.0.borrow_mut().push("world");
        }
    }

    #[test]
    fn test_listeners() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut world = World::new();
        let id = world.add_listener(Box::new(Counter(log.clone())));

        let e = world.spawn();
        world.add::<Position>(e);
        let _filter = world.filter::<Position>().build();
        world.despawn(e);
        assert_eq!(*log.borrow(), vec!["created", "filter", "destroyed"]);

        assert!(world.remove_listener(id).is_some());
        world.spawn();
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn test_destroy_empties_filters() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut world = World::new();
        world.add_listener(Box::new(Counter(log.clone())));
        let filter = world.filter::<Position>().build();
        let e = world.spawn();
        world.add::<Position>(e);

        world.destroy().unwrap();
        assert!(filter.is_empty());
        assert_eq!(log.borrow().last(), Some(&"world"));
    }

    #[test]
    #[cfg_attr(not(all(debug_assertions, not(feature = "no-sanitize"))), ignore)]
    fn test_leak_detection() {
        let mut world = World::new();
        world.spawn();
        let err = world.check_for_leaked_entities().unwrap_err();
        assert!(matches!(err, EcsError::LeakedEntities(1)));

        let fixed = world.spawn();
        world.add::<Position>(fixed);
        assert!(matches!(
            world.check_for_leaked_entities(),
            Err(EcsError::LeakedEntities(1))
        ));
    }

    #[test]
    #[cfg_attr(not(all(debug_assertions, not(feature = "no-sanitize"))), ignore)]
    fn test_reported_leak_still_fails_destroy() {
        let mut world = World::new();
        let e = world.spawn();
        assert!(world.check_for_leaked_entities().is_err());
        assert!(world.is_alive(e));
        assert_eq!(world.component_count(e), 0);
        assert!(matches!(world.destroy(), Err(EcsError::LeakedEntities(1))));
    }

    #[test]
    #[cfg_attr(not(all(debug_assertions, not(feature = "no-sanitize"))), ignore)]
    fn test_leak_tracking_drops_entities_with_components() {
        let mut world = World::new();
        for _ in 0..64 {
            let e = world.spawn();
            world.add::<Position>(e);
        }
        let empty = world.spawn();
        world.despawn(empty);
        let respawned = world.spawn();
        assert_eq!(respawned, empty);
        world.add::<Velocity>(respawned);

        assert!(world.leaked.is_empty());
        assert!(world.check_for_leaked_entities().is_ok());
    }

    #[test]
    #[cfg_attr(not(all(debug_assertions, not(feature = "no-sanitize"))), ignore)]
    #[should_panic(expected = "already attached")]
    fn test_double_add_panics() {
        let mut world = World::new();
        let e = world.spawn();
        world.add::<Position>(e);
        world.add::<Position>(e);
    }

    #[test]
    #[cfg_attr(not(all(debug_assertions, not(feature = "no-sanitize"))), ignore)]
    #[should_panic(expected = "already in constraints list")]
    fn test_duplicate_constraint_panics() {
        let mut world = World::new();
        let _ = world.filter::<Position>().without::<Position>().build();
    }

    #[test]
    #[cfg_attr(not(all(debug_assertions, not(feature = "no-sanitize"))), ignore)]
    #[should_panic(expected = "out of range")]
    fn test_touching_unknown_entity_panics() {
        let mut world = World::new();
        world.despawn(Entity::from_raw(3));
    }
}
