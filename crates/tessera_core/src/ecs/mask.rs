//! # Masks
//!
//! A mask is the include/exclude constraint set that selects a filter.
//!
//! ```text
//! world.filter::<Position>()     include [Position]
//!      .with::<Velocity>()       include [Position, Velocity]
//!      .without::<Frozen>()      exclude [Frozen]
//!      .build()                  -> sealed MaskKey -> Filter
//! ```
//!
//! Building consumes the builder. The sealed [`MaskKey`] stores sorted pool
//! ids and a precomputed hash, so identical constraint sets resolve to the
//! same filter no matter the order they were declared in.

use std::hash::{Hash, Hasher};

use super::component::Component;
use super::filter::Filter;
use super::pool::PoolId;
use super::world::World;
use crate::error::{sanitize_check, EcsError};

const HASH_FACTOR: i32 = 314_159;

/// Sealed include/exclude constraint set identifying a filter.
#[derive(Clone, Debug)]
pub struct MaskKey {
    include: Vec<PoolId>,
    exclude: Vec<PoolId>,
    hash: i32,
}

impl MaskKey {
    /// Seals the given constraints. Sorts both lists in place.
    pub(crate) fn seal(mut include: Vec<PoolId>, mut exclude: Vec<PoolId>) -> Self {
        include.sort_unstable();
        exclude.sort_unstable();

        let mut hash = (include.len() + exclude.len()) as i32;
        for id in &include {
            hash = hash
                .wrapping_mul(HASH_FACTOR)
                .wrapping_add(i32::from(id.raw()));
        }
        for id in &exclude {
            hash = hash
                .wrapping_mul(HASH_FACTOR)
                .wrapping_sub(i32::from(id.raw()));
        }

        Self {
            include,
            exclude,
            hash,
        }
    }

    /// Returns the sorted include pool ids.
    #[inline]
    #[must_use]
    pub fn include(&self) -> &[PoolId] {
        &self.include
    }

    /// Returns the sorted exclude pool ids.
    #[inline]
    #[must_use]
    pub fn exclude(&self) -> &[PoolId] {
        &self.exclude
    }

    /// Returns the precomputed mask hash.
    #[inline]
    #[must_use]
    pub fn hash_value(&self) -> i32 {
        self.hash
    }

    /// Gives the buffers back, cleared.
    pub(crate) fn into_buffers(mut self) -> (Vec<PoolId>, Vec<PoolId>) {
        self.include.clear();
        self.exclude.clear();
        (self.include, self.exclude)
    }
}

impl PartialEq for MaskKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.include == other.include && self.exclude == other.exclude
    }
}

impl Eq for MaskKey {}

impl Hash for MaskKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.hash);
    }
}

/// Filter builder returned by [`World::filter`].
///
/// # Example
///
/// ```rust
/// use tessera_core::{Component, World};
///
/// #[derive(Clone, Default)]
/// struct Position(f32, f32);
/// impl Component for Position {}
///
/// #[derive(Clone, Default)]
/// struct Frozen;
/// impl Component for Frozen {}
///
/// let mut world = World::new();
/// let moving = world.filter::<Position>().without::<Frozen>().build();
/// assert!(moving.is_empty());
/// ```
#[must_use = "a mask does nothing until built"]
pub struct Mask<'w> {
    world: &'w mut World,
    include: Vec<PoolId>,
    exclude: Vec<PoolId>,
}

impl<'w> Mask<'w> {
    pub(crate) fn new(world: &'w mut World, first: PoolId) -> Self {
        let (mut include, exclude) = world.take_mask_buffers();
        include.push(first);
        Self {
            world,
            include,
            exclude,
        }
    }

    fn check_unique<T: Component>(&self, id: PoolId) {
        sanitize_check!(
            !self.include.contains(&id) && !self.exclude.contains(&id),
            EcsError::DuplicateConstraint(std::any::type_name::<T>())
        );
    }

    /// Requires entities to own a `T`.
    ///
    /// # Panics
    ///
    /// In checked builds, panics if `T` is already constrained.
    pub fn with<T: Component>(mut self) -> Self {
        let id = self.world.pool_id::<T>();
        self.check_unique::<T>(id);
        self.include.push(id);
        self
    }

    /// Requires entities to not own a `T`.
    ///
    /// # Panics
    ///
    /// In checked builds, panics if `T` is already constrained.
    pub fn without<T: Component>(mut self) -> Self {
        let id = self.world.pool_id::<T>();
        self.check_unique::<T>(id);
        self.exclude.push(id);
        self
    }

    /// Seals the mask and returns its filter, creating it on first use.
    #[must_use]
    pub fn build(self) -> Filter {
        self.build_with_capacity(Filter::DEFAULT_CAPACITY)
    }

    /// Like [`build`](Self::build), with an explicit initial dense capacity
    /// for a newly created filter.
    #[must_use]
    pub fn build_with_capacity(self, capacity: usize) -> Filter {
        let key = MaskKey::seal(self.include, self.exclude);
        self.world.resolve_filter(key, capacity)
    }
}
