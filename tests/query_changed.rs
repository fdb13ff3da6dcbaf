//! Change-tracking behavior as seen by observers across simulated frames.

use weft_ecs::{CallerContext, ChangeRecord, Component, EntityId, World};

fn drain(world: &World, context: &CallerContext, component: &Component) -> Vec<(EntityId, ChangeRecord)> {
    context
        .scope(|| world.query_changed(component))
        .unwrap()
        .collect()
}

#[test]
fn test_first_frame_sees_existing_entities_as_new() {
    let mut world = World::new();
    let health = Component::new("Health");
    let context = CallerContext::new();

    let e1 = world.spawn([health.instance(100u32)]);
    let e2 = world.spawn([health.instance(50u32)]);
    world.spawn([]); // no Health; must not be reported

    let mut records = drain(&world, &context, &health);
    records.sort_by_key(|(entity, _)| *entity);

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].0, e1);
    assert!(records[0].1.old.is_none());
    assert_eq!(
        records[0].1.new.as_ref().unwrap().downcast_ref::<u32>(),
        Some(&100)
    );
    assert_eq!(records[1].0, e2);
}

#[test]
fn test_observers_are_independent() {
    let mut world = World::new();
    let health = Component::new("Health");
    let first = CallerContext::new();
    let second = CallerContext::new();

    let entity = world.spawn([health.instance(100u32)]);

    // Both callers are seeded independently.
    assert_eq!(drain(&world, &first, &health).len(), 1);
    assert_eq!(drain(&world, &second, &health).len(), 1);

    // A mutation lands in both storages; draining one leaves the other.
    world.insert(entity, [health.instance(90u32)]).unwrap();
    assert_eq!(drain(&world, &first, &health).len(), 1);
    assert_eq!(drain(&world, &second, &health).len(), 1);
    assert!(drain(&world, &first, &health).is_empty());
}

#[test]
fn test_despawn_is_reported_as_removal() {
    let mut world = World::new();
    let health = Component::new("Health");
    let context = CallerContext::new();

    let stored = health.instance(100u32);
    let entity = world.spawn([stored.clone()]);
    drain(&world, &context, &health);

    world.despawn(entity).unwrap();

    let records = drain(&world, &context, &health);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].0, entity);
    assert_eq!(records[0].1.old, Some(stored));
    assert_eq!(records[0].1.new, None);
}

#[test]
fn test_spawn_and_despawn_between_drains_collapses() {
    let mut world = World::new();
    let health = Component::new("Health");
    let context = CallerContext::new();

    drain(&world, &context, &health);

    let entity = world.spawn([health.instance(100u32)]);
    world.despawn(entity).unwrap();

    // The entity flickered into and out of existence; the merged record
    // carries neither a before nor an after value.
    let records = drain(&world, &context, &health);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].1.old, None);
    assert_eq!(records[0].1.new, None);
}

#[test]
fn test_changes_buffered_while_deferring_arrive_after_commit() {
    let mut world = World::new();
    let health = Component::new("Health");
    let context = CallerContext::new();

    let entity = world.spawn([health.instance(100u32)]);
    drain(&world, &context, &health);

    world.start_deferring();
    world.insert(entity, [health.instance(42u32)]).unwrap();

    // Nothing has happened yet from the observer's point of view.
    assert!(drain(&world, &context, &health).is_empty());

    world.commit_commands().unwrap();
    world.stop_deferring().unwrap();

    let records = drain(&world, &context, &health);
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].1.new.as_ref().unwrap().downcast_ref::<u32>(),
        Some(&42)
    );
}

#[test]
fn test_reinserting_the_same_instance_is_silent() {
    let mut world = World::new();
    let health = Component::new("Health");
    let context = CallerContext::new();

    let stored = health.instance(100u32);
    let entity = world.spawn([stored.clone()]);
    drain(&world, &context, &health);

    world.insert(entity, [stored]).unwrap();
    assert!(drain(&world, &context, &health).is_empty());
}
