//! Access permission and scene persistence benchmarks.
//!
//! Run with: `cargo bench --bench access_benchmarks`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use scene_core::prelude::*;

#[derive(Debug, Clone, Default)]
struct Position {
    x: f32,
    y: f32,
}

impl SerializeComponent for Position {
    fn serialize(&mut self, _cx: &mut SerializeContext<'_>, s: &mut Serializer) -> bool {
        s.serialize("x", &mut self.x) && s.serialize("y", &mut self.y)
    }
}

#[derive(Debug, Clone, Default)]
struct Parent(EntityReference);

impl SerializeComponent for Parent {
    fn serialize(&mut self, cx: &mut SerializeContext<'_>, s: &mut Serializer) -> bool {
        self.0.serialize(cx, s, "parent")
    }
}

impl ListReferences for Parent {
    fn list_references(&mut self, visit: &mut dyn FnMut(&mut EntityReference)) {
        visit(&mut self.0);
    }
}

#[derive(Debug, Clone, Default)]
struct Velocity;

fn types() -> Arc<ComponentTypeRegistry> {
    let mut builder = ComponentTypeRegistry::builder();
    register_core_components(&mut builder);
    builder.register::<Position>().serializer();
    builder.register::<Parent>().serializer().list_references();
    builder.register::<Velocity>();
    Arc::new(builder.build())
}

fn bench_try_acquire_release(c: &mut Criterion) {
    let types = types();
    let access = AccessPermissions::new(Arc::clone(&types));
    access.set_state(AccessState::Serialized);
    access.set_state(AccessState::Concurrent);

    let write: Vec<TypeIndex> = types.type_index_of::<Position>().into_iter().collect();
    let read: Vec<TypeIndex> = [types.type_index_of::<Velocity>(), types.type_index("Name")]
        .into_iter()
        .flatten()
        .collect();

    c.bench_function("try_acquire_release", |b| {
        b.iter(|| {
            assert!(access.try_acquire(black_box(&write), black_box(&read)));
            access.release(&write, &read);
        });
    });

    c.bench_function("lock_guard", |b| {
        b.iter(|| {
            let guard = access.lock(black_box(&write), black_box(&read));
            black_box(guard.is_ok())
        });
    });
}

fn populated_scene(types: &Arc<ComponentTypeRegistry>, count: usize) -> Scene {
    let config = SceneConfig {
        uid_seed: Some(1),
        ..SceneConfig::default()
    };
    let mut scene = Scene::new(Arc::clone(types), config);
    let mut previous = EntityHandle::NULL;
    for i in 0..count {
        let e = scene.create_entity(&format!("entity {i}")).unwrap();
        let store = scene.store_mut();
        store
            .emplace(
                e,
                Position {
                    x: i as f32,
                    y: 0.0,
                },
            )
            .unwrap();
        store.emplace(e, Parent(EntityReference::new(previous))).unwrap();
        previous = e;
    }
    scene
}

fn bench_save_load(c: &mut Criterion) {
    let types = types();
    let mut group = c.benchmark_group("scene");
    for &count in &[100usize, 1_000] {
        let mut source = populated_scene(&types, count);
        let document = source.save().unwrap();

        group.bench_with_input(BenchmarkId::new("save", count), &count, |b, _| {
            b.iter(|| black_box(source.save().unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("load", count), &document, |b, document| {
            b.iter(|| {
                let mut destination = Scene::new(Arc::clone(&types), SceneConfig::default());
                black_box(destination.load(document).unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_try_acquire_release, bench_save_load);
criterion_main!(benches);
