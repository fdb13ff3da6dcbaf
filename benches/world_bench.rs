//! Benchmarks for core world operations
//!
//! Run with: cargo bench
//!
//! Measures entity spawning, archetype transitions, query iteration, and
//! deferred command commits.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use weft_ecs::{Component, World};

fn bench_spawn(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    group.bench_function("spawn_1k_single_component", |b| {
        let position = Component::new("Position");
        b.iter(|| {
            let mut world = World::new();
            for i in 0..1_000 {
                let _ = world.spawn([position.instance((i as f32, 0.0f32))]);
            }
            black_box(world.len())
        });
    });

    group.bench_function("spawn_1k_three_components", |b| {
        let position = Component::new("Position");
        let velocity = Component::new("Velocity");
        let health = Component::new("Health");
        b.iter(|| {
            let mut world = World::new();
            for i in 0..1_000 {
                let _ = world.spawn([
                    position.instance((i as f32, 0.0f32)),
                    velocity.instance((1.0f32, 0.0f32)),
                    health.instance(100u32),
                ]);
            }
            black_box(world.len())
        });
    });

    group.finish();
}

fn bench_transition(c: &mut Criterion) {
    let mut group = c.benchmark_group("transition");

    group.bench_function("insert_remove_churn_1k", |b| {
        let position = Component::new("Position");
        let marker = Component::new("Marker");
        let mut world = World::new();
        let entities: Vec<_> = (0..1_000)
            .map(|i| world.spawn([position.instance(i as f32)]))
            .collect();

        b.iter(|| {
            for &entity in &entities {
                world.insert(entity, [marker.instance(())]).unwrap();
            }
            for &entity in &entities {
                world.remove(entity, &[&marker]).unwrap();
            }
        });
    });

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    let position = Component::new("Position");
    let velocity = Component::new("Velocity");
    let tag = Component::new("Tag");
    let mut world = World::new();
    for i in 0..10_000 {
        if i % 2 == 0 {
            world.spawn([
                position.instance((i as f32, 0.0f32)),
                velocity.instance((1.0f32, 0.0f32)),
            ]);
        } else {
            world.spawn([position.instance((i as f32, 0.0f32)), tag.instance(())]);
        }
    }

    group.bench_function("iterate_10k_two_archetypes", |b| {
        b.iter(|| {
            let mut total = 0usize;
            for (entity, values) in world.query(&[&position]) {
                black_box(entity);
                total += values.len();
            }
            black_box(total)
        });
    });

    group.bench_function("iterate_10k_without", |b| {
        b.iter(|| black_box(world.query(&[&position]).without(&[&tag]).count()));
    });

    group.bench_function("view_10k", |b| {
        b.iter(|| black_box(world.query(&[&position, &velocity]).view().len()));
    });

    group.finish();
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");

    group.bench_function("commit_1k_inserts", |b| {
        let counter = Component::new("Counter");
        let mut world = World::new();
        let entities: Vec<_> = (0..1_000)
            .map(|i| world.spawn([counter.instance(i as i32)]))
            .collect();

        b.iter(|| {
            world.start_deferring();
            for &entity in &entities {
                world.insert(entity, [counter.instance(0i32)]).unwrap();
            }
            world.stop_deferring().unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_spawn, bench_transition, bench_query, bench_commit);
criterion_main!(benches);
