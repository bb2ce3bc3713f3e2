//! Component kinds every scene carries.

use serde::{Deserialize, Serialize};

use crate::capability::{SerializeComponent, UiTickComponent, UiTypeInfo};
use crate::registry::RegistryBuilder;
use crate::serializer::{SerializeContext, Serializer};
use crate::ui::UiArgs;
use crate::uid::Uid;

/// Marks an entity for destruction at the next
/// [`Scene::destroy_tagged`](crate::scene::Scene::destroy_tagged).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroyTag;

/// Human-readable entity name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl SerializeComponent for Name {
    fn serialize(&mut self, _cx: &mut SerializeContext<'_>, serializer: &mut Serializer) -> bool {
        serializer.serialize("name", &mut self.0)
    }
}

impl UiTickComponent for Name {
    fn ui_tick(&mut self, args: &mut UiArgs<'_>) {
        if args.ui().edit_text("Name", &mut self.0) {
            args.modified = true;
        }
    }
}

impl UiTypeInfo for Name {
    fn ui_type_info() -> &'static str {
        "Display name of the entity."
    }
}

/// Register the built-in kinds. Call first, so they get the lowest indices.
pub fn register_core_components(builder: &mut RegistryBuilder) {
    builder.register::<DestroyTag>().ui_hidden();
    builder
        .register_named::<Uid>("UID")
        .serializer()
        .ui_type_info()
        .ui_add_remove_reset_disabled();
    builder
        .register_named::<Name>("Name")
        .serializer()
        .ui_tick()
        .ui_type_info();
}
