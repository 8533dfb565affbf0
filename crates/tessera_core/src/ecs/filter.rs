//! # Filters
//!
//! A filter is the live set of entities matching one mask, kept up to date
//! by the world on every component add and remove.
//!
//! ```text
//! dense:  [e4, e1, e9]            iteration order
//! sparse: [0, 2, 0, 0, 1, ...]    entity -> dense index + 1
//! ```
//!
//! Iterating locks the filter. While locked, membership changes are queued
//! and replayed in order once the last iterator is dropped, so the entity
//! sequence of a running iteration never shifts under it.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use super::entity::Entity;
use super::mask::MaskKey;
use crate::error::{sanitize_check, EcsError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DelayedOp {
    Add(Entity),
    Remove(Entity),
}

struct FilterState {
    dense: Vec<Entity>,
    sparse: Vec<u32>,
    lock_count: u32,
    delayed: Vec<DelayedOp>,
}

impl FilterState {
    fn apply(&mut self, op: DelayedOp) {
        match op {
            DelayedOp::Add(entity) => {
                let present = self.sparse[entity.index()] != 0;
                sanitize_check!(!present, EcsError::FilterDuplicateEntity(entity));
                if present {
                    return;
                }
                self.dense.push(entity);
                self.sparse[entity.index()] = self.dense.len() as u32;
            }
            DelayedOp::Remove(entity) => {
                let slot = self.sparse[entity.index()];
                sanitize_check!(slot != 0, EcsError::FilterMissingEntity(entity));
                if slot == 0 {
                    return;
                }
                let index = slot as usize - 1;
                self.sparse[entity.index()] = 0;
                self.dense.swap_remove(index);
                if let Some(&moved) = self.dense.get(index) {
                    self.sparse[moved.index()] = slot;
                }
            }
        }
    }

    fn push(&mut self, op: DelayedOp) {
        if self.lock_count > 0 {
            self.delayed.push(op);
        } else {
            self.apply(op);
        }
    }
}

struct FilterInner {
    mask: MaskKey,
    state: RefCell<FilterState>,
}

/// Shared handle to the entity set matching one mask.
///
/// Cloning is cheap and yields the same filter; use [`Filter::ptr_eq`] to
/// compare identity.
#[derive(Clone)]
pub struct Filter(Rc<FilterInner>);

impl Filter {
    /// Dense capacity used by [`Mask::build`](super::Mask::build).
    pub const DEFAULT_CAPACITY: usize = 512;

    pub(crate) fn new(mask: MaskKey, capacity: usize, world_size: usize) -> Self {
        Self(Rc::new(FilterInner {
            mask,
            state: RefCell::new(FilterState {
                dense: Vec::with_capacity(capacity),
                sparse: vec![0; world_size],
                lock_count: 0,
                delayed: Vec::new(),
            }),
        }))
    }

    /// Returns the sealed mask this filter matches.
    #[inline]
    #[must_use]
    pub fn mask(&self) -> &MaskKey {
        &self.0.mask
    }

    /// Returns the number of matching entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.state.borrow().dense.len()
    }

    /// Checks if no entity matches.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if the entity is currently a member.
    ///
    /// Reflects applied changes only; ops queued by a running iteration are
    /// not visible until it finishes.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        let state = self.0.state.borrow();
        state.sparse.get(entity.index()).is_some_and(|&slot| slot != 0)
    }

    /// Borrows the dense member array.
    ///
    /// # Panics
    ///
    /// Panics if the world is updating this filter at the same time, which
    /// only happens if the borrow is held across a world call.
    #[must_use]
    pub fn entities(&self) -> Ref<'_, [Entity]> {
        Ref::map(self.0.state.borrow(), |state| state.dense.as_slice())
    }

    /// Borrows the sparse reverse index (entity -> dense index + 1).
    #[must_use]
    pub fn sparse_index(&self) -> Ref<'_, [u32]> {
        Ref::map(self.0.state.borrow(), |state| state.sparse.as_slice())
    }

    /// Returns how many iterations are currently running.
    #[inline]
    #[must_use]
    pub fn lock_count(&self) -> u32 {
        self.0.state.borrow().lock_count
    }

    /// Checks if both handles point to the same filter.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Iterates over the members in dense order.
    ///
    /// The filter stays locked until the iterator is dropped.
    #[must_use]
    pub fn iter(&self) -> FilterIter<'_> {
        self.lock();
        FilterIter {
            filter: self,
            index: 0,
        }
    }

    pub(crate) fn add_entity(&self, entity: Entity) {
        self.0.state.borrow_mut().push(DelayedOp::Add(entity));
    }

    pub(crate) fn remove_entity(&self, entity: Entity) {
        self.0.state.borrow_mut().push(DelayedOp::Remove(entity));
    }

    pub(crate) fn resize(&self, world_size: usize) {
        let mut state = self.0.state.borrow_mut();
        if world_size > state.sparse.len() {
            state.sparse.resize(world_size, 0);
        }
    }

    fn lock(&self) {
        self.0.state.borrow_mut().lock_count += 1;
    }

    fn unlock(&self) {
        let mut state = self.0.state.borrow_mut();
        sanitize_check!(state.lock_count > 0, EcsError::LockImbalance);
        state.lock_count = state.lock_count.saturating_sub(1);
        if state.lock_count == 0 && !state.delayed.is_empty() {
            let delayed = std::mem::take(&mut state.delayed);
            for &op in &delayed {
                state.apply(op);
            }
            state.delayed = delayed;
            state.delayed.clear();
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.borrow();
        f.debug_struct("Filter")
            .field("include", &self.0.mask.include())
            .field("exclude", &self.0.mask.exclude())
            .field("len", &state.dense.len())
            .field("lock_count", &state.lock_count)
            .finish_non_exhaustive()
    }
}

impl<'f> IntoIterator for &'f Filter {
    type Item = Entity;
    type IntoIter = FilterIter<'f>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Scoped iterator over a [`Filter`].
///
/// Holds the filter lock for its whole lifetime, including early exits.
pub struct FilterIter<'f> {
    filter: &'f Filter,
    index: usize,
}

impl Iterator for FilterIter<'_> {
    type Item = Entity;

    #[inline]
    fn next(&mut self) -> Option<Entity> {
        let entity = self.filter.0.state.borrow().dense.get(self.index).copied();
        if entity.is_some() {
            self.index += 1;
        }
        entity
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.filter.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl Drop for FilterIter<'_> {
    fn drop(&mut self) {
        self.filter.unlock();
    }
}
