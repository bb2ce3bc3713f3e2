//! Lifecycle notifications for component kinds.
//!
//! An observer subscribes to one component kind and is told, synchronously,
//! when a value of that kind is constructed on an entity, updated through a
//! notifying write ([`EntityStore::replace`](crate::store::EntityStore::replace)
//! or [`patch`](crate::store::EntityStore::patch)), or destroyed. Destruction
//! is reported *before* the value is removed, so the observer can still read
//! it.
//!
//! The store only holds a [`Weak`] reference to each observer. When the owner
//! drops its [`Arc`], the registration lapses and is pruned on the next
//! dispatch.

use std::any::TypeId;
use std::sync::{Arc, Weak};

use crate::entity::EntityHandle;
use crate::store::EntityStore;

/// Receives construct/update/destroy notifications for one component kind.
///
/// All methods default to doing nothing.
pub trait ComponentObserver: Send + Sync {
    /// A value was attached to `entity`.
    fn on_construct(&self, _store: &EntityStore, _entity: EntityHandle) {}

    /// The value on `entity` was replaced or patched.
    fn on_update(&self, _store: &EntityStore, _entity: EntityHandle) {}

    /// The value on `entity` is about to be removed (still readable).
    fn on_destroy(&self, _store: &EntityStore, _entity: EntityHandle) {}
}

/// Which notification to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecycleEvent {
    Construct,
    Update,
    Destroy,
}

/// Token returned by [`EntityStore::subscribe`](crate::store::EntityStore::subscribe).
///
/// Pass it to [`EntityStore::unsubscribe`](crate::store::EntityStore::unsubscribe)
/// to detach explicitly; dropping the observer itself also detaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub(crate) kind: TypeId,
    pub(crate) id: u64,
}

/// Per-kind observer list.
#[derive(Default)]
pub(crate) struct ObserverList {
    entries: Vec<(u64, Weak<dyn ComponentObserver>)>,
}

impl ObserverList {
    pub(crate) fn push(&mut self, id: u64, observer: Weak<dyn ComponentObserver>) {
        self.entries.push((id, observer));
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    /// Upgrade every live observer, dropping lapsed registrations.
    pub(crate) fn live(&mut self) -> Vec<Arc<dyn ComponentObserver>> {
        let mut live = Vec::with_capacity(self.entries.len());
        self.entries.retain(|(_, weak)| match weak.upgrade() {
            Some(observer) => {
                live.push(observer);
                true
            }
            None => false,
        });
        live
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("count", &self.len())
            .finish()
    }
}
