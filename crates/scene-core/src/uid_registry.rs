//! Bidirectional `Uid` ↔ entity mapping for one store.
//!
//! The registry keeps its mapping in step with the store by observing the
//! [`Uid`] component: a constructed `Uid` is inserted, a destroyed one is
//! removed, and an updated one is a fatal error because identities never
//! change once assigned.
//!
//! Mutations are only allowed on the coordinating thread and outside
//! [`AccessState::Concurrent`]; [`UidRegistry::find`] is safe from any thread
//! at any time.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use scene_store::prelude::*;

use crate::access::{AccessPermissions, AccessState};
use crate::uid::{Uid, UidGenerator};

/// The observer half: shared with the store through a weak subscription.
#[derive(Debug)]
struct UidIndex {
    store_id: StoreId,
    map: RwLock<HashMap<Uid, EntityHandle>>,
}

impl UidIndex {
    fn check_store(&self, store: &EntityStore) {
        assert_eq!(
            store.id(),
            self.store_id,
            "UID registry received a notification from a foreign store"
        );
    }

    fn uid_of(store: &EntityStore, entity: EntityHandle) -> Uid {
        match store.get::<Uid>(entity) {
            Some(uid) => *uid,
            None => panic!("UID notification for entity {entity} without a UID component"),
        }
    }
}

impl ComponentObserver for UidIndex {
    fn on_construct(&self, store: &EntityStore, entity: EntityHandle) {
        self.check_store(store);
        assert_identity_mutation_allowed(store);
        let uid = Self::uid_of(store, entity);
        assert!(!uid.is_null(), "null UID attached to entity {entity}");
        if let Some(previous) = self.map.write().insert(uid, entity) {
            panic!("duplicate UID {uid}: already mapped to {previous}, attached again to {entity}");
        }
        tracing::trace!(uid = %uid, entity = %entity, "UID mapped");
    }

    fn on_update(&self, _store: &EntityStore, entity: EntityHandle) {
        panic!("UID of entity {entity} was modified; identities are immutable once assigned");
    }

    fn on_destroy(&self, store: &EntityStore, entity: EntityHandle) {
        self.check_store(store);
        assert_identity_mutation_allowed(store);
        let uid = Self::uid_of(store, entity);
        match self.map.write().remove(&uid) {
            Some(mapped) if mapped == entity => {
                tracing::trace!(uid = %uid, entity = %entity, "UID unmapped");
            }
            Some(mapped) => panic!("UID {uid} of entity {entity} was mapped to {mapped}"),
            None => panic!("UID {uid} of entity {entity} is missing from the registry"),
        }
    }
}

fn assert_identity_mutation_allowed(store: &EntityStore) {
    if let Some(access) = store.ctx::<AccessPermissions>() {
        assert!(
            access.is_coordinator_thread(),
            "UIDs can only change on the coordinating thread"
        );
        assert!(
            access.state() != Some(AccessState::Concurrent),
            "UIDs cannot change while the store is in concurrent mode"
        );
    }
}

/// Stable identity service for one store.
///
/// # Panics
///
/// Dropping the registry while any entity still carries a `Uid` panics: tear
/// the store down (`EntityStore::clear`) first.
#[derive(Debug)]
pub struct UidRegistry {
    index: Arc<UidIndex>,
    generator: UidGenerator,
    subscription: Subscription,
}

impl UidRegistry {
    /// Attach a registry generating random UIDs to `store`.
    pub fn attach(store: &mut EntityStore) -> Self {
        Self::with_generator(store, UidGenerator::default())
    }

    /// Attach a registry generating a reproducible UID sequence.
    pub fn seeded(store: &mut EntityStore, seed: u64) -> Self {
        Self::with_generator(store, UidGenerator::seeded(seed))
    }

    /// Attach a registry to `store`, indexing any UIDs already present.
    pub fn with_generator(store: &mut EntityStore, generator: UidGenerator) -> Self {
        let mut map = HashMap::new();
        for entity in store.entities_with::<Uid>() {
            let uid = UidIndex::uid_of(store, entity);
            if let Some(previous) = map.insert(uid, entity) {
                panic!("duplicate UID {uid} on entities {previous} and {entity}");
            }
        }

        let index = Arc::new(UidIndex {
            store_id: store.id(),
            map: RwLock::new(map),
        });
        let subscription = store.subscribe::<Uid, _>(&index);
        tracing::debug!(store = ?store.id(), existing = index.map.read().len(), "UID registry attached");

        Self {
            index,
            generator,
            subscription,
        }
    }

    /// The entity's UID, assigning a fresh one if it has none.
    ///
    /// # Panics
    ///
    /// Panics when a new UID is needed off the coordinating thread or in
    /// concurrent mode, or when `store` is not the store this registry is
    /// attached to.
    pub fn get_or_create(
        &mut self,
        store: &mut EntityStore,
        entity: EntityHandle,
    ) -> Result<Uid, StoreError> {
        self.index.check_store(store);
        if !store.valid(entity) {
            return Err(StoreError::StaleEntity { entity });
        }
        if let Some(uid) = store.get::<Uid>(entity) {
            return Ok(*uid);
        }

        assert_identity_mutation_allowed(store);
        let uid = loop {
            let candidate = self.generator.next_uid();
            if !self.index.map.read().contains_key(&candidate) {
                break candidate;
            }
        };
        store.emplace(entity, uid)?;
        Ok(uid)
    }

    /// The live entity carrying `uid`, or `EntityHandle::NULL`.
    pub fn find(&self, uid: Uid) -> EntityHandle {
        if uid.is_null() {
            return EntityHandle::NULL;
        }
        self.index
            .map
            .read()
            .get(&uid)
            .copied()
            .unwrap_or(EntityHandle::NULL)
    }

    pub fn len(&self) -> usize {
        self.index.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The store subscription keeping the mapping current.
    pub fn subscription(&self) -> Subscription {
        self.subscription
    }
}

impl Drop for UidRegistry {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let remaining = self.index.map.read().len();
        assert!(
            remaining == 0,
            "UID registry dropped with {remaining} live mappings; clear the store first"
        );
    }
}
