//! Store-scoped singletons.
//!
//! A [`Context`] holds at most one value per Rust type. Objects that belong to
//! exactly one store (its access-permission table, for instance) live here so
//! that anything holding the store can reach them.

use std::any::{Any, TypeId};
use std::collections::HashMap;

#[derive(Default)]
pub struct Context {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value`, returning the previous value of the same type.
    pub fn insert<C: Any + Send + Sync>(&mut self, value: C) -> Option<C> {
        self.values
            .insert(TypeId::of::<C>(), Box::new(value))
            .and_then(|old| old.downcast::<C>().ok())
            .map(|old| *old)
    }

    pub fn get<C: Any + Send + Sync>(&self) -> Option<&C> {
        self.values
            .get(&TypeId::of::<C>())
            .and_then(|value| value.downcast_ref::<C>())
    }

    pub fn get_mut<C: Any + Send + Sync>(&mut self) -> Option<&mut C> {
        self.values
            .get_mut(&TypeId::of::<C>())
            .and_then(|value| value.downcast_mut::<C>())
    }

    pub fn remove<C: Any + Send + Sync>(&mut self) -> Option<C> {
        self.values
            .remove(&TypeId::of::<C>())
            .and_then(|value| value.downcast::<C>().ok())
            .map(|value| *value)
    }

    pub fn contains<C: Any + Send + Sync>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<C>())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("len", &self.values.len())
            .finish()
    }
}
