//! Optional per-kind capabilities.
//!
//! A component kind opts into a capability by implementing the matching trait
//! and calling the matching method on its
//! [`Registration`](crate::registry::Registration). Kinds that do not
//! implement a trait cannot opt in, so the registry's capability table is
//! decided at compile time.

use scene_store::prelude::*;

use crate::reference::EntityReference;
use crate::serializer::{SerializeContext, Serializer};
use crate::ui::{DebugCanvas2D, DebugCanvas3D, UiArgs};

/// Bidirectional persistence of one component value.
///
/// The same routine reads and writes; branch on
/// [`Serializer::is_reading`]. Return `false` on failure.
pub trait SerializeComponent: Component + Clone + Default {
    fn serialize(&mut self, cx: &mut SerializeContext<'_>, serializer: &mut Serializer) -> bool;
}

/// Consistency check/fix-up run on demand (after load, after editing).
pub trait ValidateComponent: Component {
    fn validate(store: &mut EntityStore, entity: EntityHandle);
}

/// Enumerates the [`EntityReference`]s a component holds.
///
/// References must be visited in the same order in which
/// [`SerializeComponent::serialize`] processes them; deferred reference
/// resolution relies on that order.
pub trait ListReferences: Component {
    fn list_references(&mut self, visit: &mut dyn FnMut(&mut EntityReference));
}

/// An explicit reset routine. Kinds without one are reset by overwriting
/// them with `Default::default()`.
pub trait ResetComponent: Component + Default {
    fn reset(&mut self);
}

/// Property-panel editing.
pub trait UiTickComponent: Component {
    fn ui_tick(&mut self, args: &mut UiArgs<'_>);
}

/// Debug visualization.
pub trait UiDrawComponent: Component {
    fn ui_draw(&self, canvas_2d: &mut dyn DebugCanvas2D, canvas_3d: &mut dyn DebugCanvas3D);
}

/// A short description shown next to the kind in tooling.
pub trait UiTypeInfo: Component {
    fn ui_type_info() -> &'static str;
}
