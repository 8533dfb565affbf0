//! # World Events
//!
//! Observability hook for debugging tools. Listeners are plain trait objects
//! owned by the world and called synchronously; every callback has an empty
//! default so a listener only implements what it cares about.

use tracing::trace;

use super::entity::Entity;
use super::filter::Filter;
use super::pool::PoolId;

/// Handle returned by [`World::add_listener`](super::World::add_listener).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u32);

/// Receives structural events from a world.
pub trait WorldEventListener {
    /// An entity was spawned.
    fn on_entity_created(&mut self, _entity: Entity) {}

    /// A component was added to (`added = true`) or removed from an entity.
    fn on_entity_changed(&mut self, _entity: Entity, _pool: PoolId, _added: bool) {}

    /// An entity was recycled.
    fn on_entity_destroyed(&mut self, _entity: Entity) {}

    /// A new filter was built.
    fn on_filter_created(&mut self, _filter: &Filter) {}

    /// The entity buffer grew to `world_size` slots.
    fn on_world_resized(&mut self, _world_size: usize) {}

    /// The world is being torn down.
    fn on_world_destroyed(&mut self) {}
}

/// Listener that forwards every event to `tracing` at trace level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingListener;

impl WorldEventListener for TracingListener {
    fn on_entity_created(&mut self, entity: Entity) {
        trace!(%entity, "entity created");
    }

    fn on_entity_changed(&mut self, entity: Entity, pool: PoolId, added: bool) {
        trace!(%entity, %pool, added, "entity changed");
    }

    fn on_entity_destroyed(&mut self, entity: Entity) {
        trace!(%entity, "entity destroyed");
    }

    fn on_filter_created(&mut self, filter: &Filter) {
        trace!(
            include = filter.mask().include().len(),
            exclude = filter.mask().exclude().len(),
            len = filter.len(),
            "filter created"
        );
    }

    fn on_world_resized(&mut self, world_size: usize) {
        trace!(world_size, "world resized");
    }

    fn on_world_destroyed(&mut self) {
        trace!("world destroyed");
    }
}
