//! Bidirectional serialization over `serde_json` documents.
//!
//! A [`Serializer`] is either reading or writing, and component routines use
//! the same code path for both: `serializer.serialize("key", &mut field)`
//! stores the field when writing and overwrites it when reading. Nested
//! objects are handled with [`Serializer::section`].
//!
//! [`SerializeArgs`] carries state that outlives a single component call,
//! namely the list of references read from the document but not yet
//! resolved. [`SerializeContext`] is what a component routine actually sees:
//! a read-only view of the store plus the slot bookkeeping for references.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use scene_store::prelude::*;

use crate::reference::{LoadedReference, ReferenceSlot};
use crate::registry::TypeIndex;
use crate::uid::Uid;

// ---------------------------------------------------------------------------
// Serializer
// ---------------------------------------------------------------------------

/// Direction of a [`Serializer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeMode {
    Reading,
    Writing,
}

/// A bidirectional key/value serializer.
#[derive(Debug)]
pub struct Serializer {
    mode: SerializeMode,
    /// Open objects, innermost last. The root is always present.
    stack: Vec<Map<String, Value>>,
}

impl Serializer {
    /// A serializer that builds a new document.
    pub fn writer() -> Self {
        Self {
            mode: SerializeMode::Writing,
            stack: vec![Map::new()],
        }
    }

    /// A serializer that reads from `document`. Anything other than a JSON
    /// object reads as an empty object.
    pub fn reader(document: Value) -> Self {
        let root = match document {
            Value::Object(map) => map,
            other => {
                tracing::warn!(kind = json_kind(&other), "serializer input is not an object");
                Map::new()
            }
        };
        Self {
            mode: SerializeMode::Reading,
            stack: vec![root],
        }
    }

    pub fn mode(&self) -> SerializeMode {
        self.mode
    }

    pub fn is_reading(&self) -> bool {
        self.mode == SerializeMode::Reading
    }

    pub fn is_writing(&self) -> bool {
        self.mode == SerializeMode::Writing
    }

    /// Store `value` under `key` (writing) or overwrite `value` from `key`
    /// (reading). Returns `false` if the key is missing or does not convert.
    pub fn serialize<T>(&mut self, key: &str, value: &mut T) -> bool
    where
        T: Serialize + DeserializeOwned,
    {
        match self.mode {
            SerializeMode::Writing => match serde_json::to_value(&*value) {
                Ok(encoded) => {
                    self.current_mut().insert(key.to_owned(), encoded);
                    true
                }
                Err(err) => {
                    tracing::warn!(key, error = %err, "value could not be encoded");
                    false
                }
            },
            SerializeMode::Reading => {
                let Some(encoded) = self.current().get(key) else {
                    return false;
                };
                match T::deserialize(encoded) {
                    Ok(decoded) => {
                        *value = decoded;
                        true
                    }
                    Err(err) => {
                        tracing::warn!(key, error = %err, "value could not be decoded");
                        false
                    }
                }
            }
        }
    }

    /// Run `f` inside the nested object `key`.
    ///
    /// When reading, returns `false` without calling `f` if `key` is missing
    /// or is not an object.
    pub fn section(&mut self, key: &str, f: impl FnOnce(&mut Serializer) -> bool) -> bool {
        match self.mode {
            SerializeMode::Writing => {
                self.stack.push(Map::new());
                let ok = f(self);
                let section = self.pop();
                self.current_mut().insert(key.to_owned(), Value::Object(section));
                ok
            }
            SerializeMode::Reading => {
                let section = match self.current().get(key) {
                    Some(Value::Object(map)) => map.clone(),
                    _ => return false,
                };
                self.stack.push(section);
                let ok = f(self);
                self.pop();
                ok
            }
        }
    }

    /// `true` if the current object has `key`.
    pub fn has_key(&self, key: &str) -> bool {
        self.current().contains_key(key)
    }

    /// Keys of the current object.
    pub fn keys(&self) -> Vec<String> {
        self.current().keys().cloned().collect()
    }

    /// The finished document.
    ///
    /// # Panics
    ///
    /// Panics if called from inside an open section.
    pub fn into_value(mut self) -> Value {
        assert_eq!(self.stack.len(), 1, "serializer finished inside an open section");
        Value::Object(self.pop())
    }

    fn current(&self) -> &Map<String, Value> {
        // The root is never popped.
        &self.stack[self.stack.len() - 1]
    }

    fn current_mut(&mut self) -> &mut Map<String, Value> {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn pop(&mut self) -> Map<String, Value> {
        self.stack.pop().unwrap_or_default()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// SerializeArgs / SerializeContext
// ---------------------------------------------------------------------------

/// State shared by every component serialization in one load or save pass.
#[derive(Debug, Default)]
pub struct SerializeArgs {
    /// References read from the document, waiting for the second pass.
    pub loaded_references: Vec<LoadedReference>,
}

impl SerializeArgs {
    pub fn new() -> Self {
        Self::default()
    }
}

/// What a component's serialize routine can see.
pub struct SerializeContext<'a> {
    store: &'a EntityStore,
    args: &'a mut SerializeArgs,
    entity: EntityHandle,
    type_index: TypeIndex,
    next_ordinal: usize,
}

impl<'a> SerializeContext<'a> {
    pub fn new(
        store: &'a EntityStore,
        args: &'a mut SerializeArgs,
        entity: EntityHandle,
        type_index: TypeIndex,
    ) -> Self {
        Self {
            store,
            args,
            entity,
            type_index,
            next_ordinal: 0,
        }
    }

    /// The store being saved or loaded. The component being serialized is
    /// a detached copy, so reading it back from here gives the stored value.
    pub fn store(&self) -> &EntityStore {
        self.store
    }

    /// The entity that owns the component.
    pub fn entity(&self) -> EntityHandle {
        self.entity
    }

    pub fn type_index(&self) -> TypeIndex {
        self.type_index
    }

    pub fn args(&mut self) -> &mut SerializeArgs {
        &mut *self.args
    }

    /// Claim the slot of the next reference in this component.
    pub(crate) fn next_reference_slot(&mut self) -> ReferenceSlot {
        let slot = ReferenceSlot {
            entity: self.entity,
            type_index: self.type_index,
            ordinal: self.next_ordinal,
        };
        self.next_ordinal += 1;
        slot
    }

    pub(crate) fn queue_loaded_reference(&mut self, slot: ReferenceSlot, uid: Uid) {
        self.args.loaded_references.push(LoadedReference { slot, uid });
    }
}

impl std::fmt::Debug for SerializeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializeContext")
            .field("entity", &self.entity)
            .field("type_index", &self.type_index)
            .field("next_ordinal", &self.next_ordinal)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
