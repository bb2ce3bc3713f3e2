//! Persistent links between entities.
//!
//! An [`EntityReference`] holds a live handle at runtime and a [`Uid`] at
//! rest. Loading is two-pass: [`EntityReference::serialize`] only records the
//! UID it read, and [`resolve_loaded_references`] rewrites the queued
//! references once every entity of the document exists.

use scene_store::prelude::*;
use serde::{Deserialize, Serialize};

use crate::registry::{ComponentTypeRegistry, TypeIndex};
use crate::serializer::{SerializeArgs, SerializeContext, Serializer};
use crate::uid::Uid;
use crate::uid_registry::UidRegistry;

// ---------------------------------------------------------------------------
// EntityReference
// ---------------------------------------------------------------------------

/// A link from the owning component to another entity.
///
/// The referencing entity owns the link, not the target. A reference whose
/// target was destroyed dangles; it reads as null through [`Self::resolve`]
/// and is reset to null the next time it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityReference {
    target: EntityHandle,
}

impl Default for EntityReference {
    fn default() -> Self {
        Self {
            target: EntityHandle::NULL,
        }
    }
}

impl EntityReference {
    pub fn new(target: EntityHandle) -> Self {
        Self { target }
    }

    /// The stored handle, which may be stale.
    pub fn get(&self) -> EntityHandle {
        self.target
    }

    pub fn set(&mut self, target: EntityHandle) {
        self.target = target;
    }

    pub fn reset(&mut self) {
        self.target = EntityHandle::NULL;
    }

    pub fn is_null(&self) -> bool {
        self.target.is_null()
    }

    /// The target if it is still alive in `store`, otherwise `NULL`.
    pub fn resolve(&self, store: &EntityStore) -> EntityHandle {
        if store.valid(self.target) {
            self.target
        } else {
            EntityHandle::NULL
        }
    }

    /// Read or write the reference under `key`.
    ///
    /// Reading sets the target to null and queues a non-null UID for the
    /// resolution pass; a missing key reads as "no reference". Writing emits
    /// the target's UID, or the null UID when there is no live target.
    ///
    /// # Panics
    ///
    /// Panics when writing a live target that has no `Uid` component. Saving
    /// code must assign identities first
    /// ([`UidRegistry::get_or_create`]).
    pub fn serialize(
        &mut self,
        cx: &mut SerializeContext<'_>,
        serializer: &mut Serializer,
        key: &str,
    ) -> bool {
        let slot = cx.next_reference_slot();

        if serializer.is_reading() {
            self.target = EntityHandle::NULL;
            let mut uid = Uid::NULL;
            if serializer.serialize(key, &mut uid) && !uid.is_null() {
                cx.queue_loaded_reference(slot, uid);
            }
            return true;
        }

        if !self.target.is_null() && !cx.store().valid(self.target) {
            tracing::info!(
                owner = %cx.entity(),
                target = %self.target,
                key,
                "dangling entity reference reset to null"
            );
            self.target = EntityHandle::NULL;
        }

        let mut uid = if self.target.is_null() {
            Uid::NULL
        } else {
            match cx.store().get::<Uid>(self.target) {
                Some(uid) => *uid,
                None => panic!(
                    "referenced entity {} has no UID; identities must be assigned before writing",
                    self.target
                ),
            }
        };
        serializer.serialize(key, &mut uid)
    }
}

// ---------------------------------------------------------------------------
// Deferred resolution
// ---------------------------------------------------------------------------

/// Identifies one reference inside one component of one entity.
///
/// `ordinal` is the position of the reference in the component's serialize
/// order, which is also its position in `list_references` visiting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceSlot {
    pub entity: EntityHandle,
    pub type_index: TypeIndex,
    pub ordinal: usize,
}

/// A reference read from a document, waiting to be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedReference {
    pub slot: ReferenceSlot,
    pub uid: Uid,
}

/// Outcome of [`resolve_loaded_references`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveReport {
    /// References now pointing at a live entity.
    pub resolved: usize,
    /// References left null because their UID was not found.
    pub unresolved: usize,
}

/// Second load pass: point every queued reference at the entity that now
/// carries its UID. Drains `args.loaded_references`.
///
/// References whose UID is unknown, or whose owning component has gone
/// away, stay null and are logged.
///
/// # Panics
///
/// Panics if a queued reference belongs to a kind registered without
/// `list_references`.
pub fn resolve_loaded_references(
    types: &ComponentTypeRegistry,
    store: &mut EntityStore,
    uids: &UidRegistry,
    args: &mut SerializeArgs,
) -> ResolveReport {
    let mut pending = std::mem::take(&mut args.loaded_references);
    pending.sort_by_key(|r| (r.slot.entity.to_raw(), r.slot.type_index, r.slot.ordinal));

    let mut report = ResolveReport::default();
    let mut start = 0;
    while start < pending.len() {
        let owner = pending[start].slot.entity;
        let type_index = pending[start].slot.type_index;
        let end = pending[start..]
            .iter()
            .position(|r| r.slot.entity != owner || r.slot.type_index != type_index)
            .map_or(pending.len(), |offset| start + offset);
        let group = &pending[start..end];
        start = end;

        assert!(
            types.has_list_references(type_index),
            "component type '{}' serialized references but cannot list them",
            types.type_name(type_index)
        );

        if !types.has(type_index, store, owner) {
            tracing::warn!(
                owner = %owner,
                component = types.type_name(type_index),
                count = group.len(),
                "owner of loaded references no longer exists"
            );
            report.unresolved += group.len();
            continue;
        }

        let mut ordinal = 0;
        let mut matched = 0;
        types.list_references(type_index, store, owner, &mut |reference| {
            if let Some(loaded) = group.iter().find(|r| r.slot.ordinal == ordinal) {
                matched += 1;
                let target = uids.find(loaded.uid);
                if target.is_null() {
                    tracing::warn!(
                        owner = %owner,
                        uid = %loaded.uid,
                        "referenced UID not found; reference left null"
                    );
                    reference.reset();
                    report.unresolved += 1;
                } else {
                    reference.set(target);
                    report.resolved += 1;
                }
            }
            ordinal += 1;
        });

        if matched < group.len() {
            tracing::warn!(
                owner = %owner,
                component = types.type_name(type_index),
                missing = group.len() - matched,
                "component listed fewer references than it serialized"
            );
            report.unresolved += group.len() - matched;
        }
    }

    tracing::debug!(
        resolved = report.resolved,
        unresolved = report.unresolved,
        "loaded references resolved"
    );
    report
}
