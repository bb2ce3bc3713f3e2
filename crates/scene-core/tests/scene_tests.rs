//! Integration tests for scene save/load, stable identity and references.

use std::sync::Arc;

use scene_core::prelude::*;
use serde::{Deserialize, Serialize};

// -- test component types ---------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Transform {
    x: f32,
    y: f32,
}

impl SerializeComponent for Transform {
    fn serialize(&mut self, _cx: &mut SerializeContext<'_>, s: &mut Serializer) -> bool {
        s.serialize("x", &mut self.x) && s.serialize("y", &mut self.y)
    }
}

/// Follows one entity, falling back to another.
#[derive(Debug, Clone, Default, PartialEq)]
struct Follow {
    target: EntityReference,
    fallback: EntityReference,
    distance: f32,
}

impl SerializeComponent for Follow {
    fn serialize(&mut self, cx: &mut SerializeContext<'_>, s: &mut Serializer) -> bool {
        self.target.serialize(cx, s, "target")
            && s.serialize("distance", &mut self.distance)
            && s.section("fallback", |s| self.fallback.serialize(cx, s, "entity"))
    }
}

impl ListReferences for Follow {
    fn list_references(&mut self, visit: &mut dyn FnMut(&mut EntityReference)) {
        visit(&mut self.target);
        visit(&mut self.fallback);
    }
}

impl ValidateComponent for Follow {
    fn validate(store: &mut EntityStore, entity: EntityHandle) {
        let _ = store.patch::<Follow>(entity, |follow| {
            if follow.distance < 0.0 {
                follow.distance = 0.0;
            }
        });
    }
}

// -- helpers ----------------------------------------------------------------

fn types() -> Arc<ComponentTypeRegistry> {
    let mut builder = ComponentTypeRegistry::builder();
    register_core_components(&mut builder);
    builder.register_named::<Transform>("Transform").serializer();
    builder
        .register_named::<Follow>("Follow")
        .serializer()
        .list_references()
        .validate();
    Arc::new(builder.build())
}

fn seeded_scene(types: &Arc<ComponentTypeRegistry>, seed: u64) -> Scene {
    let config = SceneConfig {
        uid_seed: Some(seed),
        ..SceneConfig::default()
    };
    Scene::new(Arc::clone(types), config)
}

fn entity_named(scene: &Scene, name: &str) -> EntityHandle {
    scene
        .store()
        .entities_with::<Name>()
        .into_iter()
        .find(|&e| scene.store().get::<Name>(e).map(Name::as_str) == Some(name))
        .unwrap_or(EntityHandle::NULL)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn type_indices_are_dense_and_stable() {
    let types = types();
    let mut seen: Vec<usize> = types.indices().map(TypeIndex::index).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..types.type_count()).collect::<Vec<_>>());
    for index in types.indices() {
        assert_eq!(types.type_index(types.type_name(index)), Some(index));
    }
    assert_eq!(types.type_index("Follow"), types.type_index_of::<Follow>());
}

#[test]
fn references_survive_a_round_trip_into_a_store_with_different_handles() {
    let types = types();

    let mut source = seeded_scene(&types, 1);
    let leader = source.create_entity("leader").unwrap();
    let spare = source.create_entity("spare").unwrap();
    let follower = source.create_entity("follower").unwrap();
    source
        .store_mut()
        .emplace(leader, Transform { x: 3.0, y: -1.5 })
        .unwrap();
    source
        .store_mut()
        .emplace(
            follower,
            Follow {
                target: EntityReference::new(leader),
                fallback: EntityReference::new(spare),
                distance: 2.5,
            },
        )
        .unwrap();

    let json = source.save().unwrap().to_json().unwrap();
    let leader_uid = source.uid_of(leader).unwrap();

    // Shift handles in the destination so raw values differ.
    let mut destination = seeded_scene(&types, 2);
    for i in 0..5 {
        destination.create_entity(&format!("filler {i}")).unwrap();
    }
    let report = destination
        .load(&SceneDocument::from_json(&json).unwrap())
        .unwrap();
    assert_eq!(
        report,
        ResolveReport {
            resolved: 2,
            unresolved: 0
        }
    );
    assert_eq!(destination.len(), 8);

    let new_leader = entity_named(&destination, "leader");
    let new_spare = entity_named(&destination, "spare");
    let new_follower = entity_named(&destination, "follower");
    assert_ne!(new_leader, leader);
    assert_eq!(destination.find(leader_uid), new_leader);

    let follow = destination.store().get::<Follow>(new_follower).unwrap();
    assert_eq!(follow.target.get(), new_leader);
    assert_eq!(follow.fallback.get(), new_spare);
    assert_eq!(follow.distance, 2.5);
    assert_eq!(
        destination.store().get::<Transform>(new_leader),
        Some(&Transform { x: 3.0, y: -1.5 })
    );
}

#[test]
fn reference_to_entity_outside_the_document_loads_as_null() {
    let types = types();

    let mut source = seeded_scene(&types, 3);
    let target = source.create_entity("target").unwrap();
    let follower = source.create_entity("follower").unwrap();
    source
        .store_mut()
        .emplace(
            follower,
            Follow {
                target: EntityReference::new(target),
                ..Follow::default()
            },
        )
        .unwrap();
    let mut document = source.save().unwrap();

    // Drop the target from the document.
    document
        .entities
        .retain(|entity| entity.components["Name"]["name"] != "target");

    let mut destination = seeded_scene(&types, 4);
    let report = destination.load(&document).unwrap();
    assert_eq!(
        report,
        ResolveReport {
            resolved: 0,
            unresolved: 1
        }
    );
    let new_follower = entity_named(&destination, "follower");
    assert!(destination
        .store()
        .get::<Follow>(new_follower)
        .unwrap()
        .target
        .is_null());
}

#[test]
fn dangling_reference_saves_as_null_uid() {
    let types = types();
    let mut scene = seeded_scene(&types, 5);
    let target = scene.create_entity("target").unwrap();
    let follower = scene.create_entity("follower").unwrap();
    scene
        .store_mut()
        .emplace(
            follower,
            Follow {
                target: EntityReference::new(target),
                ..Follow::default()
            },
        )
        .unwrap();
    scene.destroy_entity(target).unwrap();

    let document = scene.save().unwrap();
    let saved = &document.entities[0].components["Follow"];
    assert_eq!(saved["target"], Uid::NULL.to_string());
    assert_eq!(saved["fallback"]["entity"], Uid::NULL.to_string());
    assert!(scene
        .store()
        .get::<Follow>(follower)
        .unwrap()
        .target
        .is_null());
}

#[test]
fn destroyed_entity_uid_no_longer_resolves() {
    let types = types();
    let mut scene = seeded_scene(&types, 6);
    let e = scene.create_entity("short lived").unwrap();
    let uid = scene.uid_of(e).unwrap();
    assert_eq!(scene.find(uid), e);

    scene.destroy_entity(e).unwrap();
    assert!(scene.find(uid).is_null());
    assert!(scene.uids().is_empty());
}

#[test]
fn seeded_scenes_assign_identical_uids() {
    let types = types();
    let mut a = seeded_scene(&types, 77);
    let mut b = seeded_scene(&types, 77);
    let ea = a.create_entity("x").unwrap();
    let eb = b.create_entity("x").unwrap();
    assert_eq!(a.uid_of(ea).unwrap(), b.uid_of(eb).unwrap());
}

#[test]
fn validate_all_runs_registered_validators() {
    let types = types();
    let mut scene = seeded_scene(&types, 8);
    let e = scene.create_entity("follower").unwrap();
    scene
        .store_mut()
        .emplace(
            e,
            Follow {
                distance: -4.0,
                ..Follow::default()
            },
        )
        .unwrap();
    scene.create_entity("bystander").unwrap();

    assert_eq!(scene.validate_all(), 1);
    assert_eq!(scene.store().get::<Follow>(e).unwrap().distance, 0.0);
}

#[test]
fn erased_reset_restores_defaults() {
    let types = types();
    let mut scene = seeded_scene(&types, 9);
    let e = scene.create_entity("moved").unwrap();
    scene
        .store_mut()
        .emplace(e, Transform { x: 1.0, y: 2.0 })
        .unwrap();

    let transform = types.type_index("Transform").unwrap();
    types.reset(transform, scene.store_mut(), e).unwrap();
    types.reset(transform, scene.store_mut(), e).unwrap();
    assert_eq!(
        scene.store().get::<Transform>(e),
        Some(&Transform::default())
    );
    assert_eq!(types.type_use_count(transform, scene.store()), 1);
}

#[test]
fn hand_written_document_loads_and_links() {
    let leader = Uid::from_u128(0x10);
    let follower = Uid::from_u128(0x20);
    let json = format!(
        r#"{{
            "format_version": 1,
            "entities": [
                {{ "Name": {{ "name": "leader" }}, "UID": {{ "uid": "{leader}" }},
                   "Transform": {{ "x": 1.0, "y": 2.0 }} }},
                {{ "Name": {{ "name": "follower" }}, "UID": {{ "uid": "{follower}" }},
                   "Follow": {{ "target": "{leader}", "distance": 4.0,
                                "fallback": {{ "entity": "{nil}" }} }} }}
            ]
        }}"#,
        nil = Uid::NULL,
    );

    let types = types();
    let mut scene = seeded_scene(&types, 10);
    let report = scene.load(&SceneDocument::from_json(&json).unwrap()).unwrap();
    assert_eq!(
        report,
        ResolveReport {
            resolved: 1,
            unresolved: 0
        }
    );

    let new_leader = scene.find(leader);
    let new_follower = scene.find(follower);
    assert_eq!(new_leader, entity_named(&scene, "leader"));
    let follow = scene.store().get::<Follow>(new_follower).unwrap();
    assert_eq!(follow.target.get(), new_leader);
    assert!(follow.fallback.is_null());
    assert_eq!(follow.distance, 4.0);
    assert_eq!(
        scene.store().get::<Transform>(new_leader),
        Some(&Transform { x: 1.0, y: 2.0 })
    );
}
