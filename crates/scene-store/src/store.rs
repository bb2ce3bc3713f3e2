//! The [`EntityStore`] owns entities, their components, the observers
//! subscribed to component lifecycles, and a context of store-scoped
//! singletons.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::context::Context;
use crate::entity::{EntityAllocator, EntityHandle};
use crate::observer::{ComponentObserver, LifecycleEvent, Subscription};
use crate::storage::{Component, KindSlot};
use crate::StoreError;

// ---------------------------------------------------------------------------
// StoreId
// ---------------------------------------------------------------------------

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an [`EntityStore`] instance.
///
/// Observers use it to check that a notification comes from the store they
/// were attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u64);

impl StoreId {
    fn next() -> Self {
        Self(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

/// Entity and component container.
///
/// Storage for a component kind is created lazily, the first time the kind is
/// written or subscribed to. Kinds are visited in that first-use order when an
/// entity is destroyed.
pub struct EntityStore {
    id: StoreId,
    allocator: EntityAllocator,
    kinds: Vec<KindSlot>,
    kind_index: HashMap<TypeId, usize>,
    context: Context,
    next_subscription: u64,
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("id", &self.id)
            .field("entity_count", &self.allocator.alive_count())
            .field("kind_count", &self.kinds.len())
            .finish()
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            id: StoreId::next(),
            allocator: EntityAllocator::new(),
            kinds: Vec::new(),
            kind_index: HashMap::new(),
            context: Context::new(),
            next_subscription: 0,
        }
    }

    /// This store's unique id.
    pub fn id(&self) -> StoreId {
        self.id
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an entity with no components.
    pub fn create(&mut self) -> EntityHandle {
        let entity = self.allocator.allocate();
        tracing::trace!(entity = %entity, "entity created");
        entity
    }

    /// Destroy an entity and every component attached to it.
    ///
    /// Each component's `on_destroy` observers run before that component is
    /// removed.
    pub fn destroy(&mut self, entity: EntityHandle) -> Result<(), StoreError> {
        self.ensure_valid(entity)?;
        self.destroy_live(entity);
        Ok(())
    }

    fn destroy_live(&mut self, entity: EntityHandle) {
        for slot in 0..self.kinds.len() {
            if self.kinds[slot].storage.contains(entity) {
                self.notify(slot, LifecycleEvent::Destroy, entity);
                self.kinds[slot].storage.remove_entity(entity);
            }
        }
        self.allocator.deallocate(entity);
        tracing::trace!(entity = %entity, "entity destroyed");
    }

    /// Destroy every live entity, in index order.
    pub fn clear(&mut self) {
        for entity in self.allocator.alive_handles() {
            self.destroy_live(entity);
        }
    }

    /// `true` if `entity` is a live handle of this store.
    pub fn valid(&self, entity: EntityHandle) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.allocator.alive_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All live entities in index order.
    pub fn entities(&self) -> Vec<EntityHandle> {
        self.allocator.alive_handles()
    }

    // -- typed component access ---------------------------------------------

    /// Attach `value` to `entity`. Fails if a value of this kind is present.
    pub fn emplace<T: Component>(&mut self, entity: EntityHandle, value: T) -> Result<(), StoreError> {
        self.ensure_valid(entity)?;
        let slot = self.slot_or_insert::<T>();
        if self.kinds[slot].storage.contains(entity) {
            return Err(StoreError::AlreadyPresent {
                entity,
                component: std::any::type_name::<T>(),
            });
        }
        self.kinds[slot].typed_mut::<T>().insert(entity, value);
        self.notify(slot, LifecycleEvent::Construct, entity);
        Ok(())
    }

    /// Attach `value`, overwriting any existing value of this kind.
    ///
    /// Fires `on_construct` for a fresh value and `on_update` for an overwrite.
    pub fn emplace_or_replace<T: Component>(
        &mut self,
        entity: EntityHandle,
        value: T,
    ) -> Result<(), StoreError> {
        self.ensure_valid(entity)?;
        let slot = self.slot_or_insert::<T>();
        let event = match self.kinds[slot].typed_mut::<T>().insert(entity, value) {
            Some(_) => LifecycleEvent::Update,
            None => LifecycleEvent::Construct,
        };
        self.notify(slot, event, entity);
        Ok(())
    }

    /// Overwrite an existing value. Fails if none is present.
    pub fn replace<T: Component>(&mut self, entity: EntityHandle, value: T) -> Result<(), StoreError> {
        self.patch::<T>(entity, move |current| *current = value)
    }

    /// Mutate an existing value in place, then fire `on_update`.
    pub fn patch<T: Component>(
        &mut self,
        entity: EntityHandle,
        f: impl FnOnce(&mut T),
    ) -> Result<(), StoreError> {
        self.ensure_valid(entity)?;
        let missing = StoreError::MissingComponent {
            entity,
            component: std::any::type_name::<T>(),
        };
        let slot = self.slot_of::<T>().ok_or_else(|| missing.clone())?;
        let current = self.kinds[slot]
            .typed_mut::<T>()
            .get_mut(entity)
            .ok_or(missing)?;
        f(current);
        self.notify(slot, LifecycleEvent::Update, entity);
        Ok(())
    }

    /// Detach the value of kind `T`. Returns `Ok(false)` if there was none.
    pub fn remove<T: Component>(&mut self, entity: EntityHandle) -> Result<bool, StoreError> {
        self.ensure_valid(entity)?;
        let Some(slot) = self.slot_of::<T>() else {
            return Ok(false);
        };
        if !self.kinds[slot].storage.contains(entity) {
            return Ok(false);
        }
        self.notify(slot, LifecycleEvent::Destroy, entity);
        self.kinds[slot].typed_mut::<T>().take(entity);
        Ok(true)
    }

    /// Shared access to the value of kind `T` on `entity`.
    pub fn get<T: Component>(&self, entity: EntityHandle) -> Option<&T> {
        self.slot_of::<T>()
            .and_then(|slot| self.kinds[slot].typed::<T>().get(entity))
    }

    /// Exclusive access to the value of kind `T` on `entity`.
    ///
    /// Writes through this reference are silent: no observer is notified.
    pub fn get_mut<T: Component>(&mut self, entity: EntityHandle) -> Option<&mut T> {
        let slot = self.slot_of::<T>()?;
        self.kinds[slot].typed_mut::<T>().get_mut(entity)
    }

    pub fn has<T: Component>(&self, entity: EntityHandle) -> bool {
        self.slot_of::<T>()
            .is_some_and(|slot| self.kinds[slot].storage.contains(entity))
    }

    /// Number of live values of kind `T`.
    pub fn count<T: Component>(&self) -> usize {
        self.slot_of::<T>()
            .map_or(0, |slot| self.kinds[slot].storage.len())
    }

    /// Entities carrying kind `T`, in index order.
    pub fn entities_with<T: Component>(&self) -> Vec<EntityHandle> {
        let Some(slot) = self.slot_of::<T>() else {
            return Vec::new();
        };
        let mut handles: Vec<_> = self.kinds[slot].typed::<T>().handles().collect();
        handles.sort_by_key(|h| h.index());
        handles
    }

    // -- observers ----------------------------------------------------------

    /// Subscribe `observer` to lifecycle notifications of kind `T`.
    ///
    /// Only a weak reference is kept; the subscription lapses when the last
    /// strong reference to the observer is dropped.
    pub fn subscribe<T, O>(&mut self, observer: &Arc<O>) -> Subscription
    where
        T: Component,
        O: ComponentObserver + 'static,
    {
        let slot = self.slot_or_insert::<T>();
        let id = self.next_subscription;
        self.next_subscription += 1;
        let weak: Weak<O> = Arc::downgrade(observer);
        let weak: Weak<dyn ComponentObserver> = weak;
        self.kinds[slot].observers.push(id, weak);
        Subscription {
            kind: TypeId::of::<T>(),
            id,
        }
    }

    /// Detach a subscription. Returns `false` if it had already lapsed.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        match self.kind_index.get(&subscription.kind) {
            Some(&slot) => self.kinds[slot].observers.remove(subscription.id),
            None => false,
        }
    }

    /// Number of live observers subscribed to kind `T`.
    pub fn observer_count<T: Component>(&self) -> usize {
        self.slot_of::<T>()
            .map_or(0, |slot| self.kinds[slot].observers.len())
    }

    // -- context ------------------------------------------------------------

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Shorthand for `self.context().get::<C>()`.
    pub fn ctx<C: std::any::Any + Send + Sync>(&self) -> Option<&C> {
        self.context.get::<C>()
    }

    // -- internals ----------------------------------------------------------

    fn ensure_valid(&self, entity: EntityHandle) -> Result<(), StoreError> {
        if self.valid(entity) {
            Ok(())
        } else {
            Err(StoreError::StaleEntity { entity })
        }
    }

    fn slot_of<T: Component>(&self) -> Option<usize> {
        self.kind_index.get(&TypeId::of::<T>()).copied()
    }

    fn slot_or_insert<T: Component>(&mut self) -> usize {
        if let Some(slot) = self.slot_of::<T>() {
            return slot;
        }
        let slot = self.kinds.len();
        self.kinds.push(KindSlot::new::<T>());
        self.kind_index.insert(TypeId::of::<T>(), slot);
        slot
    }

    fn notify(&mut self, slot: usize, event: LifecycleEvent, entity: EntityHandle) {
        let observers = self.kinds[slot].observers.live();
        for observer in &observers {
            match event {
                LifecycleEvent::Construct => observer.on_construct(self, entity),
                LifecycleEvent::Update => observer.on_update(self, entity),
                LifecycleEvent::Destroy => observer.on_destroy(self, entity),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
