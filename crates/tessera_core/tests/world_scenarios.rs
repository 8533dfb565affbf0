//! Integration tests for world lifecycle, growth and reentrant iteration.

use std::cell::Cell;
use std::rc::Rc;

use tessera_core::{Component, PackedEntity, World, WorldConfig};

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
struct Dead;
impl Component for Dead {}

/// Shares its counter on copy.
#[derive(Clone, Default, Debug)]
struct SharedCounter(Rc<Cell<u32>>);
impl Component for SharedCounter {}

/// Allocates a fresh counter on copy.
#[derive(Clone, Default, Debug)]
struct OwnedCounter(Rc<Cell<u32>>);
impl Component for OwnedCounter {
    fn auto_copy(src: &Self, dst: &mut Self) {
        dst.0 = Rc::new(Cell::new(src.0.get()));
    }
}

#[test]
fn test_lifecycle_scenario() {
    let mut world = World::new();
    let moving = world.filter::<Position>().with::<Velocity>().build();

    let e1 = world.spawn();
    world.insert(e1, Position { x: 0.0, y: 0.0 });
    world.insert(e1, Velocity { x: 1.0, y: 0.0 });
    let e2 = world.spawn();
    world.insert(e2, Position { x: 5.0, y: 5.0 });

    assert_eq!(moving.iter().collect::<Vec<_>>(), vec![e1]);

    world.remove::<Velocity>(e1);
    assert!(moving.is_empty());

    let packed = world.pack(e1);
    world.despawn(e1);
    assert!(!world.is_alive(e1));
    assert_eq!(packed.unpack(&world), None);

    let reused = world.spawn();
    assert_eq!(reused, e1);
    world.add::<Position>(reused);
    assert_eq!(world.entity_gen(reused), 2);
    assert_eq!(packed.unpack(&world), None);
    assert_ne!(world.pack(reused), packed);

    world.destroy().unwrap();
}

#[test]
fn test_growth_scenario() {
    let mut world = World::with_config(WorldConfig::with_entities(4));
    let filter = world.filter::<Position>().build();

    let entities: Vec<_> = (0..5)
        .map(|i| {
            let e = world.spawn();
            world.insert(e, Position { x: i as f32, y: -(i as f32) });
            e
        })
        .collect();

    assert_eq!(world.world_size(), 8);
    assert_eq!(filter.len(), 5);
    for (i, &e) in entities.iter().enumerate() {
        assert!(world.is_alive(e));
        assert!(filter.contains(e));
        assert_eq!(world.get::<Position>(e), &Position { x: i as f32, y: -(i as f32) });
    }
}

#[test]
fn test_removal_during_iteration_is_deferred() {
    let mut world = World::new();
    let alive = world.filter::<Position>().without::<Dead>().build();
    let entities: Vec<_> = (0..8)
        .map(|i| {
            let e = world.spawn();
            world.insert(e, Position { x: i as f32, y: 0.0 });
            e
        })
        .collect();

    let mut visited = Vec::new();
    for e in &alive {
        visited.push(e);
        if world.get::<Position>(e).x as usize % 2 == 0 {
            world.add::<Dead>(e);
        }
        // The running iteration keeps its snapshot.
        assert_eq!(alive.len(), 8);
    }

    assert_eq!(visited, entities);
    assert_eq!(alive.len(), 4);
    for e in &alive {
        assert!(!world.has::<Dead>(e));
    }
}

#[test]
fn test_despawn_inside_nested_iteration() {
    let mut world = World::new();
    let positions = world.filter::<Position>().build();
    let velocities = world.filter::<Velocity>().build();
    for _ in 0..4 {
        let e = world.spawn();
        world.add::<Position>(e);
        world.add::<Velocity>(e);
    }

    let mut pairs = 0;
    for a in &positions {
        for b in &velocities {
            pairs += 1;
            if a == b {
                world.despawn(b);
            }
        }
    }

    // Each outer step sees the inner filter after the previous removal.
    assert_eq!(pairs, 4 + 3 + 2 + 1);
    assert!(positions.is_empty());
    assert!(velocities.is_empty());
    assert_eq!(world.entities_count(), 0);
}

#[test]
fn test_copy_is_shallow_unless_overridden() {
    let mut world = World::new();
    let src = world.spawn();
    world.add::<SharedCounter>(src).0.set(1);
    world.add::<OwnedCounter>(src).0.set(1);
    let dst = world.spawn();
    world.add::<Position>(dst);

    world.copy_entity(src, dst);
    world.get::<SharedCounter>(dst).0.set(7);
    world.get::<OwnedCounter>(dst).0.set(7);

    assert_eq!(world.get::<SharedCounter>(src).0.get(), 7);
    assert_eq!(world.get::<OwnedCounter>(src).0.get(), 1);
}

#[test]
fn test_packed_null_never_resolves() {
    let mut world = World::new();
    let e = world.spawn();
    world.add::<Position>(e);
    assert_eq!(PackedEntity::NULL.unpack(&world), None);
    assert_eq!(world.describe(&PackedEntity::NULL), "Entity-Null");
}
