//! # TESSERA Core Engine
//!
//! Sparse-set Entity Component System (ECS) storage engine:
//! - Generational entities packed into one flat raw-slot buffer
//! - One dense pool per component type, no archetype moves
//! - Filters maintained incrementally, safe to mutate while iterating
//!
//! ## Architecture Rules
//!
//! 1. **Everything grows by doubling** - sizes in [`WorldConfig`] are only
//!    starting points
//! 2. **Checked builds validate, release builds trust** - see
//!    [`error::SANITIZE`]
//! 3. **One writer per world** - a world never leaves its thread
//!
//! ## Example
//!
//! ```rust
//! use tessera_core::{Component, World};
//!
//! #[derive(Clone, Default)]
//! struct Position(f32, f32);
//! impl Component for Position {}
//!
//! let mut world = World::new();
//! let positioned = world.filter::<Position>().build();
//! let entity = world.spawn();
//! world.insert(entity, Position(1.0, 2.0));
//! assert_eq!(positioned.len(), 1);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;

pub use config::WorldConfig;
pub use ecs::{
    AnyPool, Component, ComponentMeta, ComponentPool, EntityRegistry, Entity, Filter, JsonCodec,
    PackedEntity, PackedEntityWithWorld, PoolId, RawComponent, World, WorldEventListener,
};
pub use error::{EcsError, EcsResult};
