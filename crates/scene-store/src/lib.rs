//! Scene Store -- entity and component container with lifecycle observers.
//!
//! This crate is the storage layer the scene core is built on. It knows
//! nothing about component registration, access control or stable identity;
//! it provides:
//!
//! - generational [`EntityHandle`](entity::EntityHandle)s with a null sentinel,
//! - per-kind typed storage with `emplace`/`replace`/`patch`/`remove`,
//! - synchronous construct/update/destroy [observers](observer),
//! - a [`Context`](context::Context) of store-scoped singletons.
//!
//! # Quick Start
//!
//! ```
//! use scene_store::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Health(u32);
//!
//! let mut store = EntityStore::new();
//! let entity = store.create();
//! store.emplace(entity, Health(100)).unwrap();
//! store.patch::<Health>(entity, |h| h.0 -= 10).unwrap();
//!
//! assert_eq!(store.get::<Health>(entity), Some(&Health(90)));
//! store.destroy(entity).unwrap();
//! assert!(!store.valid(entity));
//! ```

#![deny(unsafe_code)]

pub mod context;
pub mod entity;
pub mod observer;
pub mod storage;
pub mod store;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The handle is null, stale, or was never allocated by this store.
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::EntityHandle },

    /// `emplace` on an entity that already carries the component.
    #[error("entity {entity:?} already has component '{component}'")]
    AlreadyPresent {
        entity: entity::EntityHandle,
        component: &'static str,
    },

    /// `replace`/`patch` on an entity that does not carry the component.
    #[error("entity {entity:?} has no component '{component}'")]
    MissingComponent {
        entity: entity::EntityHandle,
        component: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::context::Context;
    pub use crate::entity::{EntityAllocator, EntityHandle};
    pub use crate::observer::{ComponentObserver, Subscription};
    pub use crate::storage::Component;
    pub use crate::store::{EntityStore, StoreId};
    pub use crate::StoreError;
}
