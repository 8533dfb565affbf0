//! # Entity Store
//!
//! Raw entity slots packed into one flat `i16` buffer.
//!
//! ```text
//! item_size = COMPONENTS + components capacity
//!
//! raw: [count, gen, p0, p1, .., count, gen, p0, p1, .., ...]
//!       |------ slot 0 ------|  |------ slot 1 ------|
//! ```
//!
//! Generations are positive while a slot is alive and negative while it
//! sits on the recycle list. Every slot has the same capacity for pool ids;
//! when one entity outgrows it, the capacity doubles and every slot is
//! repacked.

use super::entity::{raw_offsets, Entity};
use super::pool::PoolId;
use crate::error::{sanitize_check, EcsError};

/// Internal manager for raw entity slots.
pub(crate) struct EntityStore {
    /// Flat slot buffer, `world_size * item_size` values.
    raw: Vec<i16>,
    /// Length of one slot in `i16` values.
    item_size: usize,
    /// Number of slots ever handed out (alive or recycled).
    count: usize,
    /// Recycled slot indices, reused last-in first-out.
    recycled: Vec<u32>,
}

/// Result of allocating a slot.
pub(crate) struct Allocation {
    /// The allocated entity.
    pub entity: Entity,
    /// New world size if the buffer had to grow.
    pub resized: Option<usize>,
}

impl EntityStore {
    /// Creates a store with room for `capacity` entities.
    pub fn new(capacity: usize, recycled_capacity: usize, components_size: usize) -> Self {
        let item_size = raw_offsets::COMPONENTS + components_size.max(1);
        Self {
            raw: vec![0; capacity.max(1) * item_size],
            item_size,
            count: 0,
            recycled: Vec::with_capacity(recycled_capacity),
        }
    }

    #[inline]
    fn offset(&self, entity: Entity) -> usize {
        entity.index() * self.item_size
    }

    /// Number of slots the buffer currently holds.
    #[inline]
    pub fn world_size(&self) -> usize {
        self.raw.len() / self.item_size
    }

    /// Number of slots ever handed out.
    #[inline]
    pub fn used_count(&self) -> usize {
        self.count
    }

    /// Number of alive entities.
    #[inline]
    pub fn alive_count(&self) -> usize {
        self.count - self.recycled.len()
    }

    /// Length of one raw slot.
    #[inline]
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// The whole raw buffer.
    #[inline]
    pub fn raw(&self) -> &[i16] {
        &self.raw
    }

    /// Checks if the slot is in use and alive.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        entity.index() < self.count && self.raw[self.offset(entity) + raw_offsets::GEN] > 0
    }

    /// Checks if the slot has ever been handed out.
    #[inline]
    pub fn in_range(&self, entity: Entity) -> bool {
        entity.index() < self.count
    }

    /// Returns the slot generation, or 0 for slots never handed out.
    #[inline]
    pub fn gen(&self, entity: Entity) -> i16 {
        if self.in_range(entity) {
            self.raw[self.offset(entity) + raw_offsets::GEN]
        } else {
            0
        }
    }

    /// Returns how many pools own data for the entity.
    #[inline]
    pub fn components_count(&self, entity: Entity) -> usize {
        if !self.in_range(entity) {
            return 0;
        }
        // Never negative: the count only moves through attach/detach.
        self.raw[self.offset(entity) + raw_offsets::COMPONENTS_COUNT].unsigned_abs() as usize
    }

    /// Returns the pool ids attached to the entity, in attach order with
    /// swap-removals applied.
    #[inline]
    pub fn component_ids(&self, entity: Entity) -> impl DoubleEndedIterator<Item = PoolId> + '_ {
        let len = self.components_count(entity);
        let start = if len == 0 {
            0
        } else {
            self.offset(entity) + raw_offsets::COMPONENTS
        };
        self.raw[start..start + len].iter().map(|&id| PoolId::from_raw(id))
    }

    /// Allocates a slot, recycling one when possible.
    pub fn allocate(&mut self) -> Allocation {
        if let Some(index) = self.recycled.pop() {
            let entity = Entity::from_raw(index);
            let gen = self.offset(entity) + raw_offsets::GEN;
            self.raw[gen] = -self.raw[gen];
            return Allocation {
                entity,
                resized: None,
            };
        }

        let mut resized = None;
        if self.count * self.item_size == self.raw.len() {
            let new_size = (self.count << 1).max(1);
            self.raw.resize(new_size * self.item_size, 0);
            resized = Some(new_size);
        }

        let entity = Entity::from_raw(self.count as u32);
        self.count += 1;
        let offset = self.offset(entity);
        self.raw[offset + raw_offsets::COMPONENTS_COUNT] = 0;
        self.raw[offset + raw_offsets::GEN] = 1;
        Allocation { entity, resized }
    }

    /// Marks the slot dead and pushes it onto the recycle list.
    ///
    /// # Returns
    ///
    /// `false` if the slot was already dead.
    pub fn recycle(&mut self, entity: Entity) -> bool {
        let gen = self.offset(entity) + raw_offsets::GEN;
        let current = self.raw[gen];
        if current < 0 {
            return false;
        }
        self.raw[gen] = if current == i16::MAX {
            -1
        } else {
            -(current + 1)
        };
        self.recycled.push(entity.raw());
        true
    }

    /// Appends a pool id to the entity's component list.
    ///
    /// # Returns
    ///
    /// The new per-slot component capacity if every slot had to be repacked.
    pub fn attach(&mut self, entity: Entity, pool: PoolId) -> Option<usize> {
        let mut grown = None;
        let count = self.components_count(entity);
        if count + raw_offsets::COMPONENTS == self.item_size {
            grown = Some(self.extend_components());
        }

        let offset = self.offset(entity);
        self.raw[offset + raw_offsets::COMPONENTS_COUNT] += 1;
        self.raw[offset + raw_offsets::COMPONENTS + count] = pool.raw();
        grown
    }

    /// Swap-removes a pool id from the entity's component list.
    ///
    /// # Returns
    ///
    /// The number of components left on the entity.
    pub fn detach(&mut self, entity: Entity, pool: PoolId) -> usize {
        let offset = self.offset(entity);
        let data = offset + raw_offsets::COMPONENTS;
        let count = self.components_count(entity);
        let found = self.raw[data..data + count]
            .iter()
            .position(|&id| id == pool.raw());

        sanitize_check!(
            found.is_some(),
            EcsError::ComponentMissing {
                entity,
                component: "pool id in raw entity slot",
            }
        );
        let Some(position) = found else {
            return count;
        };

        let last = count - 1;
        if position < last {
            self.raw[data + position] = self.raw[data + last];
        }
        self.raw[offset + raw_offsets::COMPONENTS_COUNT] -= 1;
        last
    }

    /// Doubles the per-slot component capacity and repacks every slot.
    fn extend_components(&mut self) -> usize {
        let capacity = (self.item_size - raw_offsets::COMPONENTS) << 1;
        let new_item_size = raw_offsets::COMPONENTS + capacity;
        let mut raw = vec![0; self.world_size() * new_item_size];
        for slot in 0..self.count {
            let old = slot * self.item_size;
            let new = slot * new_item_size;
            let len = raw_offsets::COMPONENTS + self.components_count(Entity::from_raw(slot as u32));
            raw[new..new + len].copy_from_slice(&self.raw[old..old + len]);
        }
        self.raw = raw;
        self.item_size = new_item_size;
        capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_recycle() {
        let mut store = EntityStore::new(4, 4, 2);
        let a = store.allocate().entity;
        let b = store.allocate().entity;
        assert_eq!(a.raw(), 0);
        assert_eq!(b.raw(), 1);
        assert_eq!(store.gen(a), 1);
        assert!(store.is_alive(a));

        assert!(store.recycle(a));
        assert!(!store.is_alive(a));
        assert_eq!(store.gen(a), -2);
        assert!(!store.recycle(a));
        assert_eq!(store.alive_count(), 1);

        let c = store.allocate().entity;
        assert_eq!(c, a);
        assert_eq!(store.gen(c), 2);
        assert_eq!(store.alive_count(), 2);
    }

    #[test]
    fn test_generation_wraps() {
        let mut store = EntityStore::new(1, 1, 1);
        let a = store.allocate().entity;
        let gen = store.offset(a) + raw_offsets::GEN;
        store.raw[gen] = i16::MAX;
        store.recycle(a);
        assert_eq!(store.gen(a), -1);
        store.allocate();
        assert_eq!(store.gen(a), 1);
    }

    #[test]
    fn test_buffer_growth() {
        let mut store = EntityStore::new(2, 2, 2);
        assert!(store.allocate().resized.is_none());
        assert!(store.allocate().resized.is_none());
        assert_eq!(store.allocate().resized, Some(4));
        assert_eq!(store.world_size(), 4);
        assert_eq!(store.used_count(), 3);
    }

    #[test]
    fn test_attach_detach() {
        let mut store = EntityStore::new(2, 2, 4);
        let a = store.allocate().entity;
        store.attach(a, PoolId::from_raw(3));
        store.attach(a, PoolId::from_raw(5));
        store.attach(a, PoolId::from_raw(7));
        assert_eq!(store.components_count(a), 3);

        assert_eq!(store.detach(a, PoolId::from_raw(3)), 2);
        let ids: Vec<i16> = store.component_ids(a).map(PoolId::raw).collect();
        assert_eq!(ids, vec![7, 5]);
    }

    #[test]
    fn test_component_capacity_repacks_slots() {
        let mut store = EntityStore::new(2, 2, 1);
        let a = store.allocate().entity;
        let b = store.allocate().entity;
        store.attach(a, PoolId::from_raw(1));
        store.attach(b, PoolId::from_raw(9));
        assert_eq!(store.attach(a, PoolId::from_raw(2)), Some(2));
        assert_eq!(store.item_size(), raw_offsets::COMPONENTS + 2);

        let a_ids: Vec<i16> = store.component_ids(a).map(PoolId::raw).collect();
        let b_ids: Vec<i16> = store.component_ids(b).map(PoolId::raw).collect();
        assert_eq!(a_ids, vec![1, 2]);
        assert_eq!(b_ids, vec![9]);
        assert_eq!(store.gen(b), 1);
    }
}
