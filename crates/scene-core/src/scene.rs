//! The scene: a store wired up with access permissions and stable identity,
//! plus two-pass save and load.
//!
//! A saved scene is a [`SceneDocument`]: one JSON object per entity, keyed by
//! registered component name, holding whatever that kind's serializer wrote.
//! Entity handles are not saved. Links between entities go through UIDs and
//! are rewritten after every entity of the document has been created.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use scene_store::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::access::{AccessPermissions, AccessState};
use crate::components::{DestroyTag, Name};
use crate::config::SceneConfig;
use crate::reference::{resolve_loaded_references, ResolveReport};
use crate::registry::{ComponentTypeRegistry, TypeIndex};
use crate::serializer::{SerializeArgs, Serializer};
use crate::uid::Uid;
use crate::uid_registry::UidRegistry;
use crate::SceneError;

/// Current [`SceneDocument::format_version`].
pub const SCENE_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

/// Saved components of one entity, keyed by component name. Serialized as
/// the bare name-to-section object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityDocument {
    pub components: BTreeMap<String, Value>,
}

/// A saved scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    pub format_version: u32,
    pub entities: Vec<EntityDocument>,
}

impl SceneDocument {
    pub fn to_json(&self) -> Result<String, SceneError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(json)?)
    }
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

/// An entity store with its access permissions and UID registry.
///
/// Dropping the scene destroys every entity first, so the UID registry is
/// empty by the time it is torn down. A scene must be back in
/// [`AccessState::Serialized`] (or `SerializedDelete`) before it is dropped;
/// dropping it in concurrent mode panics.
pub struct Scene {
    types: Arc<ComponentTypeRegistry>,
    config: SceneConfig,
    store: EntityStore,
    uids: UidRegistry,
}

impl Scene {
    /// Create an empty scene in [`AccessState::Serialized`]. The calling
    /// thread becomes the coordinating thread.
    pub fn new(types: Arc<ComponentTypeRegistry>, config: SceneConfig) -> Self {
        let mut store = EntityStore::new();
        AccessPermissions::install(&mut store, Arc::clone(&types));
        if let Some(access) = store.ctx::<AccessPermissions>() {
            access.set_state(AccessState::Serialized);
        }
        let uids = match config.uid_seed {
            Some(seed) => UidRegistry::seeded(&mut store, seed),
            None => UidRegistry::attach(&mut store),
        };
        tracing::debug!(store = ?store.id(), types = types.type_count(), "scene created");

        Self {
            types,
            config,
            store,
            uids,
        }
    }

    pub fn types(&self) -> &Arc<ComponentTypeRegistry> {
        &self.types
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Direct store access for component data. Structural changes should go
    /// through the scene so the access state is checked.
    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    pub fn uids(&self) -> &UidRegistry {
        &self.uids
    }

    pub fn access(&self) -> &AccessPermissions {
        match self.store.ctx::<AccessPermissions>() {
            Some(access) => access,
            None => panic!("scene store has no access permissions"),
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    // -- entities -----------------------------------------------------------

    /// Create an entity, named unless `name` is empty.
    ///
    /// # Panics
    ///
    /// Panics outside [`AccessState::Serialized`].
    pub fn create_entity(&mut self, name: &str) -> Result<EntityHandle, SceneError> {
        self.assert_state(&[AccessState::Serialized], "create entities");
        let entity = self.store.create();
        if !name.is_empty() {
            self.store.emplace(entity, Name::new(name))?;
        }
        Ok(entity)
    }

    /// # Panics
    ///
    /// Panics in [`AccessState::Concurrent`].
    pub fn destroy_entity(&mut self, entity: EntityHandle) -> Result<(), SceneError> {
        self.assert_state(
            &[AccessState::Serialized, AccessState::SerializedDelete],
            "destroy entities",
        );
        self.store.destroy(entity)?;
        Ok(())
    }

    /// Tag `entity` for the next [`destroy_tagged`](Self::destroy_tagged).
    ///
    /// # Panics
    ///
    /// Panics outside [`AccessState::Serialized`].
    pub fn mark_for_destroy(&mut self, entity: EntityHandle) -> Result<(), SceneError> {
        self.assert_state(&[AccessState::Serialized], "mark entities for destroy");
        self.store.emplace_or_replace(entity, DestroyTag)?;
        Ok(())
    }

    /// Destroy every tagged entity inside an
    /// [`AccessState::SerializedDelete`] window. Returns how many went.
    pub fn destroy_tagged(&mut self) -> Result<usize, SceneError> {
        self.access().set_state(AccessState::SerializedDelete);
        let tagged = self.store.entities_with::<DestroyTag>();
        let mut result = Ok(tagged.len());
        for entity in tagged {
            if let Err(err) = self.store.destroy(entity) {
                result = Err(err.into());
                break;
            }
        }
        self.access().set_state(AccessState::Serialized);
        if let Ok(count) = result {
            tracing::debug!(count, "tagged entities destroyed");
        }
        result
    }

    /// The UID of `entity`, assigned on first request.
    pub fn uid_of(&mut self, entity: EntityHandle) -> Result<Uid, SceneError> {
        Ok(self.uids.get_or_create(&mut self.store, entity)?)
    }

    /// The live entity carrying `uid`, or `EntityHandle::NULL`.
    pub fn find(&self, uid: Uid) -> EntityHandle {
        self.uids.find(uid)
    }

    // -- access state -------------------------------------------------------

    /// Enter [`AccessState::Concurrent`]. Systems may now run in parallel
    /// over the types they acquire through [`access`](Self::access).
    pub fn begin_concurrent(&self) {
        self.access().set_state(AccessState::Concurrent);
    }

    pub fn end_concurrent(&self) {
        self.access().set_state(AccessState::Serialized);
    }

    // -- validation ---------------------------------------------------------

    /// Run every registered validator on every entity carrying its kind.
    /// Returns the number of validator calls.
    pub fn validate_all(&mut self) -> usize {
        let validating: Vec<TypeIndex> = self
            .types
            .indices()
            .filter(|&index| self.types.has_validate(index))
            .collect();
        let mut calls = 0;
        for entity in self.store.entities() {
            for &index in &validating {
                if self.store.valid(entity) && self.types.has(index, &self.store, entity) {
                    self.types.validate(index, &mut self.store, entity);
                    calls += 1;
                }
            }
        }
        calls
    }

    // -- persistence --------------------------------------------------------

    /// Write every entity, giving each one a UID first.
    ///
    /// # Errors
    ///
    /// [`SceneError::SerializeFailed`] if a component's serializer fails.
    pub fn save(&mut self) -> Result<SceneDocument, SceneError> {
        self.assert_state(&[AccessState::Serialized], "save");

        let entities = self.store.entities();
        for &entity in &entities {
            self.uids.get_or_create(&mut self.store, entity)?;
        }

        let serializable: Vec<TypeIndex> = self
            .types
            .indices()
            .filter(|&index| self.types.has_serialize(index))
            .collect();
        let mut args = SerializeArgs::new();
        let mut documents = Vec::with_capacity(entities.len());

        for entity in entities {
            let mut document = EntityDocument::default();
            for &index in &serializable {
                if !self.types.has(index, &self.store, entity) {
                    continue;
                }
                let mut writer = Serializer::writer();
                if !self
                    .types
                    .serialize(index, &mut self.store, entity, &mut args, &mut writer)
                {
                    return Err(SceneError::SerializeFailed {
                        component: self.types.type_name(index).to_owned(),
                        entity,
                    });
                }
                document
                    .components
                    .insert(self.types.type_name(index).to_owned(), writer.into_value());
            }
            documents.push(document);
        }

        tracing::info!(entities = documents.len(), "scene saved");
        Ok(SceneDocument {
            format_version: SCENE_FORMAT_VERSION,
            entities: documents,
        })
    }

    /// Add the entities of `document` to the scene, then resolve the
    /// references between them.
    ///
    /// The document is checked before anything is created; if reading a
    /// component fails, the entities created by this call are destroyed
    /// again.
    ///
    /// # Errors
    ///
    /// - [`SceneError::UnsupportedVersion`] for a foreign format version.
    /// - [`SceneError::UnknownComponent`] for a name that is not a
    ///   registered serializable kind, when `strict_components` is set.
    /// - [`SceneError::DuplicateUid`] when a UID repeats within the document
    ///   or already exists in the scene.
    /// - [`SceneError::DeserializeFailed`] when a component does not read.
    pub fn load(&mut self, document: &SceneDocument) -> Result<ResolveReport, SceneError> {
        self.assert_state(&[AccessState::Serialized], "load");

        if document.format_version != SCENE_FORMAT_VERSION {
            return Err(SceneError::UnsupportedVersion {
                found: document.format_version,
                expected: SCENE_FORMAT_VERSION,
            });
        }

        let plan = self.plan_load(document)?;

        let mut args = SerializeArgs::new();
        let mut created = Vec::with_capacity(plan.len());
        for sections in plan {
            let entity = self.store.create();
            created.push(entity);
            for (index, value) in sections {
                let mut reader = Serializer::reader(value.clone());
                if !self
                    .types
                    .serialize(index, &mut self.store, entity, &mut args, &mut reader)
                {
                    let component = self.types.type_name(index).to_owned();
                    for entity in created {
                        self.store.destroy(entity)?;
                    }
                    return Err(SceneError::DeserializeFailed {
                        component,
                        details: "component serializer rejected its section".to_owned(),
                    });
                }
            }
        }

        let report = resolve_loaded_references(&self.types, &mut self.store, &self.uids, &mut args);
        tracing::info!(
            entities = created.len(),
            resolved = report.resolved,
            unresolved = report.unresolved,
            "scene loaded"
        );
        Ok(report)
    }

    /// Map every section of `document` to a type index, in registration
    /// order per entity, and reject UID collisions.
    fn plan_load<'d>(
        &self,
        document: &'d SceneDocument,
    ) -> Result<Vec<Vec<(TypeIndex, &'d Value)>>, SceneError> {
        let uid_index = self.types.type_index_of::<Uid>();
        let mut seen_uids = HashSet::new();
        let mut plan = Vec::with_capacity(document.entities.len());

        for entity in &document.entities {
            let mut sections = Vec::with_capacity(entity.components.len());
            for (name, value) in &entity.components {
                let index = match self.types.type_index(name) {
                    Some(index) if self.types.has_serialize(index) => index,
                    _ if self.config.strict_components => {
                        return Err(SceneError::UnknownComponent {
                            name: name.clone(),
                            registered: self.types.registered_names(),
                        });
                    }
                    _ => {
                        tracing::warn!(component = %name, "skipping unknown component in scene document");
                        continue;
                    }
                };

                if Some(index) == uid_index {
                    let uid = saved_uid(name, value)?;
                    if !uid.is_null() && (!seen_uids.insert(uid) || !self.uids.find(uid).is_null()) {
                        return Err(SceneError::DuplicateUid { uid });
                    }
                }
                sections.push((index, value));
            }
            sections.sort_by_key(|(index, _)| *index);
            plan.push(sections);
        }
        Ok(plan)
    }

    fn assert_state(&self, allowed: &[AccessState], action: &str) {
        let access = self.access();
        assert!(
            access.is_coordinator_thread(),
            "cannot {action} off the coordinating thread"
        );
        let state = access.state();
        assert!(
            state.is_some_and(|state| allowed.contains(&state)),
            "cannot {action} in access state {state:?}"
        );
    }
}

fn saved_uid(name: &str, value: &Value) -> Result<Uid, SceneError> {
    let raw = value.get("uid").cloned().unwrap_or(Value::Null);
    serde_json::from_value(raw).map_err(|err| SceneError::DeserializeFailed {
        component: name.to_owned(),
        details: err.to_string(),
    })
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("store", &self.store)
            .field("uids", &self.uids.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        assert!(
            self.access().state() != Some(AccessState::Concurrent),
            "scene dropped in concurrent mode; call end_concurrent first"
        );
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::register_core_components;

    fn scene() -> Scene {
        let mut builder = ComponentTypeRegistry::builder();
        register_core_components(&mut builder);
        let config = SceneConfig {
            uid_seed: Some(99),
            ..SceneConfig::default()
        };
        Scene::new(Arc::new(builder.build()), config)
    }

    #[test]
    fn new_scene_starts_serialized() {
        let scene = scene();
        assert_eq!(scene.access().state(), Some(AccessState::Serialized));
        assert!(scene.is_empty());
        assert_eq!(scene.store().observer_count::<Uid>(), 1);
    }

    #[test]
    fn tagged_entities_are_destroyed_in_a_delete_window() {
        let mut scene = scene();
        let keep = scene.create_entity("keep").unwrap();
        let a = scene.create_entity("a").unwrap();
        let b = scene.create_entity("").unwrap();
        scene.uid_of(a).unwrap();
        scene.mark_for_destroy(a).unwrap();
        scene.mark_for_destroy(b).unwrap();

        assert_eq!(scene.destroy_tagged().unwrap(), 2);
        assert_eq!(scene.access().state(), Some(AccessState::Serialized));
        assert!(scene.store().valid(keep));
        assert!(!scene.store().valid(a));
        assert!(scene.uids().is_empty());
    }

    #[test]
    fn save_assigns_uids_and_names_sections() {
        let mut scene = scene();
        let e = scene.create_entity("lamp").unwrap();
        let document = scene.save().unwrap();

        assert_eq!(document.format_version, SCENE_FORMAT_VERSION);
        assert_eq!(document.entities.len(), 1);
        let saved = &document.entities[0].components;
        assert_eq!(saved["Name"], serde_json::json!({ "name": "lamp" }));
        let uid = scene.store().get::<Uid>(e).copied().unwrap();
        assert_eq!(saved["UID"], serde_json::json!({ "uid": uid.to_string() }));
        assert!(!saved.contains_key("DestroyTag"));
    }

    #[test]
    fn unknown_component_is_rejected_before_anything_changes() {
        let mut scene = scene();
        let mut entity = EntityDocument::default();
        entity
            .components
            .insert("Mystery".to_owned(), serde_json::json!({}));
        let document = SceneDocument {
            format_version: SCENE_FORMAT_VERSION,
            entities: vec![EntityDocument::default(), entity],
        };

        let err = scene.load(&document).unwrap_err();
        assert!(matches!(err, SceneError::UnknownComponent { ref name, .. } if name == "Mystery"));
        assert!(scene.is_empty());
    }

    #[test]
    fn lenient_load_skips_unknown_components() {
        let mut builder = ComponentTypeRegistry::builder();
        register_core_components(&mut builder);
        let config = SceneConfig {
            strict_components: false,
            uid_seed: None,
        };
        let mut scene = Scene::new(Arc::new(builder.build()), config);

        let mut entity = EntityDocument::default();
        entity
            .components
            .insert("Mystery".to_owned(), serde_json::json!({}));
        entity
            .components
            .insert("Name".to_owned(), serde_json::json!({ "name": "kept" }));
        let document = SceneDocument {
            format_version: SCENE_FORMAT_VERSION,
            entities: vec![entity],
        };

        scene.load(&document).unwrap();
        assert_eq!(scene.len(), 1);
        let e = scene.store().entities()[0];
        assert_eq!(scene.store().get::<Name>(e).unwrap().as_str(), "kept");
    }

    #[test]
    fn loading_the_same_document_twice_is_a_uid_collision() {
        let mut scene = scene();
        scene.create_entity("only").unwrap();
        let document = scene.save().unwrap();
        let err = scene.load(&document).unwrap_err();
        assert!(matches!(err, SceneError::DuplicateUid { .. }));
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn failed_component_read_rolls_back_created_entities() {
        let mut scene = scene();
        let mut good = EntityDocument::default();
        good.components
            .insert("Name".to_owned(), serde_json::json!({ "name": "fine" }));
        let mut bad = EntityDocument::default();
        bad.components
            .insert("Name".to_owned(), serde_json::json!({ "name": 12 }));
        let document = SceneDocument {
            format_version: SCENE_FORMAT_VERSION,
            entities: vec![good, bad],
        };

        let err = scene.load(&document).unwrap_err();
        assert!(matches!(err, SceneError::DeserializeFailed { ref component, .. } if component == "Name"));
        assert!(scene.is_empty());
    }

    #[test]
    fn foreign_version_is_rejected() {
        let mut scene = scene();
        let document = SceneDocument {
            format_version: 7,
            entities: Vec::new(),
        };
        assert!(matches!(
            scene.load(&document),
            Err(SceneError::UnsupportedVersion { found: 7, .. })
        ));
    }

    #[test]
    #[should_panic(expected = "cannot create entities")]
    fn structural_change_in_concurrent_mode_panics() {
        let mut scene = scene();
        scene.begin_concurrent();
        let _ = scene.create_entity("late");
    }

    #[test]
    #[should_panic(expected = "cannot mark entities for destroy")]
    fn marking_for_destroy_in_concurrent_mode_panics() {
        let mut scene = scene();
        let e = scene.create_entity("late").unwrap();
        scene.begin_concurrent();
        let _ = scene.mark_for_destroy(e);
    }

    #[test]
    #[should_panic(expected = "scene dropped in concurrent mode")]
    fn dropping_a_concurrent_scene_panics_with_a_clear_message() {
        let mut scene = scene();
        let e = scene.create_entity("held").unwrap();
        scene.uid_of(e).unwrap();
        scene.begin_concurrent();
        drop(scene);
    }

    #[test]
    fn entities_are_saved_as_bare_component_objects() {
        let mut scene = scene();
        scene.create_entity("flat").unwrap();
        let value = serde_json::to_value(scene.save().unwrap()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["format_version"], SCENE_FORMAT_VERSION);
        assert_eq!(value["entities"][0]["Name"], serde_json::json!({ "name": "flat" }));
        assert!(value["entities"][0].get("components").is_none());
    }

    #[test]
    fn document_json_round_trip() {
        let mut scene = scene();
        scene.create_entity("json").unwrap();
        let document = scene.save().unwrap();
        let text = document.to_json().unwrap();
        assert_eq!(SceneDocument::from_json(&text).unwrap(), document);
        assert!(SceneDocument::from_json("not json").is_err());
    }
}
