//! # Entity Component System
//!
//! A sparse-set ECS: every component type lives in its own dense pool, and
//! filters keep a live list of the entities matching an include/exclude
//! mask.
//!
//! ## Design Philosophy
//!
//! - Entities are plain slot indices with a generation counter
//! - Components are stored in dense arrays, one pool per type
//! - Filters are updated incrementally on every add and remove
//! - Structural changes during iteration are queued, never lost

mod component;
mod entity;
mod entity_store;
mod events;
mod filter;
mod mask;
mod pool;
pub mod registry;
pub mod serialization;
mod world;

pub use component::{Component, ComponentMeta, RawComponent};
pub use entity::{raw_offsets, Entity, PackedEntity, PackedEntityWithWorld, WorldId};
pub use events::{ListenerId, TracingListener, WorldEventListener};
pub use filter::{Filter, FilterIter};
pub use mask::{Mask, MaskKey};
pub use pool::{AnyPool, ComponentPool, PoolId};
pub use registry::{
    ComponentMap, EntityName, EntityRegistry, EntitySnapshot, PersistentId, Serializable,
};
pub use serialization::{EntityJson, JsonCodec};
pub use world::{PoolMut, World};
