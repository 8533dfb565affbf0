//! # Entity Management
//!
//! Entities are lightweight identifiers:
//! - [`Entity`] is the raw slot index handed out by the world and yielded by
//!   filters. It carries no generation and is only meaningful while the
//!   caller knows the slot is alive.
//! - [`PackedEntity`] pairs the slot index with the generation it had when
//!   packed, so it can be stored across frames and verified in O(1).
//! - [`PackedEntityWithWorld`] additionally records which world issued it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::world::World;

/// Offsets of the fields inside one raw entity slot.
///
/// A slot is laid out as `[components_count, generation, pool_id...]` in the
/// world's flat `i16` buffer.
pub mod raw_offsets {
    /// Number of component pools owning data for the entity.
    pub const COMPONENTS_COUNT: usize = 0;
    /// Generation counter: positive when alive, negative when recycled.
    pub const GEN: usize = 1;
    /// First pool id of the attached-component list.
    pub const COMPONENTS: usize = 2;
}

/// Raw entity identifier (slot index).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Entity(u32);

impl Entity {
    /// Creates an entity from a raw slot index.
    #[inline]
    #[must_use]
    pub const fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw slot index.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the slot index as a `usize` for array access.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a world instance, unique for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorldId(u64);

impl WorldId {
    /// Allocates a fresh world id.
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Entity reference that survives slot recycling.
///
/// Two packed entities are equal when both id and generation match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PackedEntity {
    /// Slot index.
    pub id: Entity,
    /// Generation of the slot when the entity was packed.
    pub gen: i16,
}

impl PackedEntity {
    /// The null entity reference (`id = 0, gen = 0`).
    pub const NULL: Self = Self {
        id: Entity(0),
        gen: 0,
    };

    /// Checks if this is the null entity reference.
    #[inline]
    #[must_use]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    /// Resolves the reference against a world.
    ///
    /// # Returns
    ///
    /// The raw entity if its slot is alive and still has the packed
    /// generation, `None` otherwise.
    #[inline]
    #[must_use]
    pub fn unpack(self, world: &World) -> Option<Entity> {
        (world.is_alive(self.id) && world.entity_gen(self.id) == self.gen).then_some(self.id)
    }
}

/// Entity reference that also records the issuing world.
///
/// Equality compares id, generation, and world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PackedEntityWithWorld {
    /// Slot index.
    pub id: Entity,
    /// Generation of the slot when the entity was packed.
    pub gen: i16,
    /// World that issued the entity.
    pub world: WorldId,
}

impl PackedEntityWithWorld {
    /// Resolves the reference against a world.
    ///
    /// # Returns
    ///
    /// The raw entity if `world` is the issuing world and the slot is alive
    /// with the packed generation, `None` otherwise.
    #[inline]
    #[must_use]
    pub fn unpack(self, world: &World) -> Option<Entity> {
        if world.id() != self.world {
            return None;
        }
        self.packed().unpack(world)
    }

    /// Drops the world identity.
    #[inline]
    #[must_use]
    pub const fn packed(self) -> PackedEntity {
        PackedEntity {
            id: self.id,
            gen: self.gen,
        }
    }
}
