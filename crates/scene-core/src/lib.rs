//! Scene Core -- component type registry, access control and stable entity
//! identity on top of [`scene_store`].
//!
//! - [`registry`]: dense [`TypeIndex`](registry::TypeIndex) per registered
//!   component kind and type-erased dispatch of its optional capabilities.
//! - [`access`]: the `Serialized`/`SerializedDelete`/`Concurrent` mode switch
//!   and per-type read/write try-locks.
//! - [`uid_registry`] and [`reference`]: persistent identities and links
//!   between entities that survive save and load.
//! - [`scene`]: a store wired up with all of the above, with two-pass save
//!   and load.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use scene_core::prelude::*;
//!
//! let mut builder = ComponentTypeRegistry::builder();
//! register_core_components(&mut builder);
//! let types = Arc::new(builder.build());
//!
//! let mut scene = Scene::new(types.clone(), SceneConfig::default());
//! let lamp = scene.create_entity("lamp").unwrap();
//! let uid = scene.uid_of(lamp).unwrap();
//! assert_eq!(scene.find(uid), lamp);
//!
//! let name = types.type_index("Name").unwrap();
//! scene.begin_concurrent();
//! assert!(scene.access().try_acquire(&[], &[name]));
//! assert!(!scene.access().try_acquire(&[name], &[]));
//! scene.access().release(&[], &[name]);
//! scene.end_concurrent();
//! ```

#![deny(unsafe_code)]

pub mod access;
pub mod capability;
pub mod components;
pub mod config;
pub mod reference;
pub mod registry;
pub mod scene;
pub mod serializer;
pub mod ui;
pub mod uid;
pub mod uid_registry;

pub use scene_store;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by scene operations.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] scene_store::StoreError),

    /// A document names a component kind that is not registered as
    /// serializable.
    #[error("component type '{name}' is not a registered serializable kind. Registered components: [{registered}]")]
    UnknownComponent { name: String, registered: String },

    /// A component's serializer failed while writing.
    #[error("failed to serialize component '{component}' of entity {entity:?}")]
    SerializeFailed {
        component: String,
        entity: scene_store::entity::EntityHandle,
    },

    /// A component's serializer failed while reading.
    #[error("failed to deserialize component '{component}': {details}")]
    DeserializeFailed { component: String, details: String },

    /// A document UID repeats, or is already in use in the scene.
    #[error("UID {uid} is already in use")]
    DuplicateUid { uid: uid::Uid },

    #[error("unsupported scene format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("scene document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::access::{AccessConflict, AccessGuard, AccessMode, AccessPermissions, AccessState};
    pub use crate::capability::{
        ListReferences, ResetComponent, SerializeComponent, UiDrawComponent, UiTickComponent,
        UiTypeInfo, ValidateComponent,
    };
    pub use crate::components::{register_core_components, DestroyTag, Name};
    pub use crate::config::SceneConfig;
    pub use crate::reference::{resolve_loaded_references, EntityReference, ResolveReport};
    pub use crate::registry::{ComponentTypeInfo, ComponentTypeRegistry, RegistryBuilder, TypeIndex};
    pub use crate::scene::{EntityDocument, Scene, SceneDocument, SCENE_FORMAT_VERSION};
    pub use crate::serializer::{SerializeArgs, SerializeContext, Serializer};
    pub use crate::ui::{ComponentUi, DebugCanvas2D, DebugCanvas3D, UiArgs};
    pub use crate::uid::{Uid, UidGenerator};
    pub use crate::uid_registry::UidRegistry;
    pub use crate::SceneError;
    pub use scene_store::prelude::*;
}
