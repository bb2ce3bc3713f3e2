//! Per-kind component storage.
//!
//! Each component kind lives in its own [`TypedStorage`], keyed by entity
//! handle. The store reaches storages through the object-safe
//! [`ErasedStorage`] trait for the operations that do not need the concrete
//! type (presence checks and removal on entity destruction).

use std::any::Any;
use std::collections::HashMap;

use crate::entity::EntityHandle;
use crate::observer::ObserverList;

/// Marker for types that can be stored as components.
///
/// Blanket-implemented for every `Send + Sync + 'static` type.
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// Type-erased view of a [`TypedStorage`].
pub(crate) trait ErasedStorage: Send + Sync {
    fn contains(&self, entity: EntityHandle) -> bool;
    fn remove_entity(&mut self, entity: EntityHandle) -> bool;
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Storage for every value of one component kind.
#[derive(Debug)]
pub(crate) struct TypedStorage<T> {
    values: HashMap<EntityHandle, T>,
}

impl<T> TypedStorage<T> {
    pub(crate) fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub(crate) fn get(&self, entity: EntityHandle) -> Option<&T> {
        self.values.get(&entity)
    }

    pub(crate) fn get_mut(&mut self, entity: EntityHandle) -> Option<&mut T> {
        self.values.get_mut(&entity)
    }

    /// Insert, returning the previous value if one was present.
    pub(crate) fn insert(&mut self, entity: EntityHandle, value: T) -> Option<T> {
        self.values.insert(entity, value)
    }

    pub(crate) fn take(&mut self, entity: EntityHandle) -> Option<T> {
        self.values.remove(&entity)
    }

    pub(crate) fn handles(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.values.keys().copied()
    }
}

impl<T: Component> ErasedStorage for TypedStorage<T> {
    fn contains(&self, entity: EntityHandle) -> bool {
        self.values.contains_key(&entity)
    }

    fn remove_entity(&mut self, entity: EntityHandle) -> bool {
        self.values.remove(&entity).is_some()
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A storage plus the observers subscribed to its kind.
pub(crate) struct KindSlot {
    pub(crate) type_name: &'static str,
    pub(crate) storage: Box<dyn ErasedStorage>,
    pub(crate) observers: ObserverList,
}

impl KindSlot {
    pub(crate) fn new<T: Component>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            storage: Box::new(TypedStorage::<T>::new()),
            observers: ObserverList::default(),
        }
    }

    pub(crate) fn typed<T: Component>(&self) -> &TypedStorage<T> {
        self.storage
            .as_any()
            .downcast_ref::<TypedStorage<T>>()
            .unwrap_or_else(|| panic!("storage slot type mismatch for {}", self.type_name))
    }

    pub(crate) fn typed_mut<T: Component>(&mut self) -> &mut TypedStorage<T> {
        let type_name = self.type_name;
        self.storage
            .as_any_mut()
            .downcast_mut::<TypedStorage<T>>()
            .unwrap_or_else(|| panic!("storage slot type mismatch for {type_name}"))
    }
}

impl std::fmt::Debug for KindSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindSlot")
            .field("type_name", &self.type_name)
            .field("len", &self.storage.len())
            .field("observers", &self.observers)
            .finish()
    }
}
