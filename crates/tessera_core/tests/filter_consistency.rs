//! Randomized check that filter membership always matches the mask.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tessera_core::{Component, Entity, Filter, World};

#[derive(Clone, Default, Debug)]
#[allow(dead_code)]
struct A(u32);
impl Component for A {}

#[derive(Clone, Default, Debug)]
#[allow(dead_code)]
struct B(u32);
impl Component for B {}

#[derive(Clone, Default, Debug)]
#[allow(dead_code)]
struct C(u32);
impl Component for C {}

/// Keeps every entity alive with at least one component.
#[derive(Clone, Default, Debug)]
struct Anchor;
impl Component for Anchor {}

fn toggle<T: Component>(world: &mut World, entity: Entity) {
    if world.has::<T>(entity) {
        world.remove::<T>(entity);
    } else {
        world.add::<T>(entity);
    }
}

fn check(world: &World, filter: &Filter, entities: &[Entity]) {
    for &e in entities {
        let expected = world.has::<A>(e) && world.has::<B>(e) && !world.has::<C>(e);
        assert_eq!(filter.contains(e), expected, "entity {e}");
    }
    let members = filter.entities();
    assert_eq!(
        members.len(),
        entities
            .iter()
            .filter(|&&e| world.has::<A>(e) && world.has::<B>(e) && !world.has::<C>(e))
            .count()
    );
    for (index, &e) in members.iter().enumerate() {
        assert_eq!(filter.sparse_index()[e.index()] as usize, index + 1);
    }
}

#[test]
fn test_random_interleavings() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x7e55e4a);
    let mut world = World::new();
    let filter = world.filter::<A>().with::<B>().without::<C>().build();

    let entities: Vec<Entity> = (0..64)
        .map(|_| {
            let e = world.spawn();
            world.add::<Anchor>(e);
            e
        })
        .collect();

    for _ in 0..5_000 {
        let e = entities[rng.gen_range(0..entities.len())];
        match rng.gen_range(0..3) {
            0 => toggle::<A>(&mut world, e),
            1 => toggle::<B>(&mut world, e),
            _ => toggle::<C>(&mut world, e),
        }
        check(&world, &filter, &entities);
    }
}

#[test]
fn test_random_interleavings_while_iterating() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut world = World::new();
    let filter = world.filter::<A>().with::<B>().without::<C>().build();
    let watch = world.filter::<Anchor>().build();

    let entities: Vec<Entity> = (0..32)
        .map(|_| {
            let e = world.spawn();
            world.add::<Anchor>(e);
            world.add::<A>(e);
            world.add::<B>(e);
            e
        })
        .collect();

    for _ in 0..50 {
        for _ in &watch {
            for _ in 0..4 {
                let e = entities[rng.gen_range(0..entities.len())];
                match rng.gen_range(0..3) {
                    0 => toggle::<A>(&mut world, e),
                    1 => toggle::<B>(&mut world, e),
                    _ => toggle::<C>(&mut world, e),
                }
            }
        }
        check(&world, &filter, &entities);
    }
}

#[test]
fn test_filter_created_midway_matches() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut world = World::new();
    let entities: Vec<Entity> = (0..32)
        .map(|_| {
            let e = world.spawn();
            world.add::<Anchor>(e);
            e
        })
        .collect();

    for _ in 0..200 {
        let e = entities[rng.gen_range(0..entities.len())];
        if rng.gen_bool(0.5) {
            toggle::<A>(&mut world, e);
        } else {
            toggle::<B>(&mut world, e);
        }
    }

    let filter = world.filter::<B>().with::<A>().without::<C>().build();
    check(&world, &filter, &entities);
}
