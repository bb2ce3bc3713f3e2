//! Component type registration and type-erased dispatch.
//!
//! Every component kind that must be reachable without knowing its Rust type
//! (serialization, tooling, access declarations) is registered once, at
//! startup, through a [`RegistryBuilder`]. Registration assigns a dense
//! [`TypeIndex`] in registration order and binds a table of callbacks for the
//! capabilities the kind supports. [`RegistryBuilder::build`] freezes the
//! result into an immutable [`ComponentTypeRegistry`], which is shared by
//! `Arc` with everything that needs it.
//!
//! All `TypeIndex` arguments must be in `[0, type_count)`, and capability
//! dispatchers (`serialize`, `ui_tick`, ...) may only be called when the
//! matching `has_*` query is true. Both are caller bugs and panic.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use scene_store::prelude::*;

use crate::capability::{
    ListReferences, ResetComponent, SerializeComponent, UiDrawComponent, UiTickComponent,
    UiTypeInfo, ValidateComponent,
};
use crate::reference::EntityReference;
use crate::serializer::{SerializeArgs, SerializeContext, Serializer};
use crate::ui::{DebugCanvas2D, DebugCanvas3D, UiArgs};

// ---------------------------------------------------------------------------
// TypeIndex
// ---------------------------------------------------------------------------

/// Dense index of a registered component kind, stable for the lifetime of the
/// registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIndex(u32);

impl TypeIndex {
    /// Wrap a raw index. Lookups validate it against the registry.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeIndex({})", self.0)
    }
}

impl fmt::Display for TypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Callback table
// ---------------------------------------------------------------------------

type HasFn = fn(&EntityStore, EntityHandle) -> bool;
type EmplaceOrReplaceFn = fn(&mut EntityStore, EntityHandle) -> Result<(), StoreError>;
type RemoveFn = fn(&mut EntityStore, EntityHandle) -> Result<bool, StoreError>;
type TotalCountFn = fn(&EntityStore) -> usize;
type SerializeFn =
    fn(&mut EntityStore, EntityHandle, TypeIndex, &mut SerializeArgs, &mut Serializer) -> bool;
type UiTickFn = fn(&mut EntityStore, EntityHandle, &mut UiArgs<'_>);
type UiTypeInfoFn = fn() -> &'static str;
type ValidateFn = fn(&mut EntityStore, EntityHandle);
type ListReferencesFn = fn(&mut EntityStore, EntityHandle, &mut dyn FnMut(&mut EntityReference));
type UiDrawFn = fn(&EntityStore, EntityHandle, &mut dyn DebugCanvas2D, &mut dyn DebugCanvas3D);
type ResetFn = fn(&mut EntityStore, EntityHandle) -> Result<(), StoreError>;

/// Type-erased operations bound to one component kind at registration.
///
/// The first four are always present. The rest are `None` when the kind does
/// not support the capability.
#[derive(Clone, Copy)]
pub struct ComponentCallbacks {
    has: HasFn,
    emplace_or_replace: EmplaceOrReplaceFn,
    remove: RemoveFn,
    total_count: TotalCountFn,
    serialize: Option<SerializeFn>,
    ui_tick: Option<UiTickFn>,
    ui_type_info: Option<UiTypeInfoFn>,
    validate: Option<ValidateFn>,
    list_references: Option<ListReferencesFn>,
    ui_draw: Option<UiDrawFn>,
    reset: Option<ResetFn>,
}

impl ComponentCallbacks {
    fn new<T: Component + Default>() -> Self {
        Self {
            has: has_component::<T>,
            emplace_or_replace: emplace_default::<T>,
            remove: remove_component::<T>,
            total_count: count_components::<T>,
            serialize: None,
            ui_tick: None,
            ui_type_info: None,
            validate: None,
            list_references: None,
            ui_draw: None,
            reset: None,
        }
    }
}

impl fmt::Debug for ComponentCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentCallbacks")
            .field("serialize", &self.serialize.is_some())
            .field("ui_tick", &self.ui_tick.is_some())
            .field("ui_type_info", &self.ui_type_info.is_some())
            .field("validate", &self.validate.is_some())
            .field("list_references", &self.list_references.is_some())
            .field("ui_draw", &self.ui_draw.is_some())
            .field("reset", &self.reset.is_some())
            .finish()
    }
}

fn has_component<T: Component>(store: &EntityStore, entity: EntityHandle) -> bool {
    store.has::<T>(entity)
}

fn emplace_default<T: Component + Default>(
    store: &mut EntityStore,
    entity: EntityHandle,
) -> Result<(), StoreError> {
    store.emplace_or_replace(entity, T::default())
}

fn remove_component<T: Component>(
    store: &mut EntityStore,
    entity: EntityHandle,
) -> Result<bool, StoreError> {
    store.remove::<T>(entity)
}

fn count_components<T: Component>(store: &EntityStore) -> usize {
    store.count::<T>()
}

/// Serialize a copy of the stored value so the routine can look at the rest
/// of the store (reference targets) while it runs.
///
/// Reading commits through `emplace_or_replace`, so construct observers see
/// loaded values. Writing commits silently, keeping any fix-ups the routine
/// made (a dangling reference reset to null) without an update notification.
fn serialize_component<T: SerializeComponent>(
    store: &mut EntityStore,
    entity: EntityHandle,
    type_index: TypeIndex,
    args: &mut SerializeArgs,
    serializer: &mut Serializer,
) -> bool {
    if serializer.is_reading() {
        let mut value = store.get::<T>(entity).cloned().unwrap_or_default();
        let mut cx = SerializeContext::new(store, args, entity, type_index);
        if !value.serialize(&mut cx, serializer) {
            return false;
        }
        match store.emplace_or_replace(entity, value) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    component = std::any::type_name::<T>(),
                    error = %err,
                    "loaded component could not be attached"
                );
                false
            }
        }
    } else {
        let Some(current) = store.get::<T>(entity) else {
            tracing::warn!(
                component = std::any::type_name::<T>(),
                entity = %entity,
                "cannot write a component the entity does not have"
            );
            return false;
        };
        let mut value = current.clone();
        let mut cx = SerializeContext::new(store, args, entity, type_index);
        let ok = value.serialize(&mut cx, serializer);
        if let Some(slot) = store.get_mut::<T>(entity) {
            *slot = value;
        }
        ok
    }
}

fn ui_tick_component<T: UiTickComponent>(
    store: &mut EntityStore,
    entity: EntityHandle,
    args: &mut UiArgs<'_>,
) {
    if let Some(component) = store.get_mut::<T>(entity) {
        component.ui_tick(args);
    }
}

fn ui_draw_component<T: UiDrawComponent>(
    store: &EntityStore,
    entity: EntityHandle,
    canvas_2d: &mut dyn DebugCanvas2D,
    canvas_3d: &mut dyn DebugCanvas3D,
) {
    if let Some(component) = store.get::<T>(entity) {
        component.ui_draw(canvas_2d, canvas_3d);
    }
}

fn list_component_references<T: ListReferences>(
    store: &mut EntityStore,
    entity: EntityHandle,
    visit: &mut dyn FnMut(&mut EntityReference),
) {
    if let Some(component) = store.get_mut::<T>(entity) {
        component.list_references(visit);
    }
}

fn reset_component<T: ResetComponent>(
    store: &mut EntityStore,
    entity: EntityHandle,
) -> Result<(), StoreError> {
    if store.has::<T>(entity) {
        store.patch::<T>(entity, T::reset)
    } else {
        store.emplace(entity, T::default())
    }
}

// ---------------------------------------------------------------------------
// ComponentTypeInfo
// ---------------------------------------------------------------------------

/// Descriptor of one registered component kind.
#[derive(Debug, Clone)]
pub struct ComponentTypeInfo {
    /// Dense index, equal to the registration position.
    pub index: TypeIndex,
    /// Unique human-readable name; the key used in saved scenes.
    pub name: String,
    /// `std::any::type_name::<T>()`
    pub rust_type_name: &'static str,
    pub type_id: TypeId,
    pub ui_visible: bool,
    pub ui_add_remove_reset_disabled: bool,
    pub callbacks: ComponentCallbacks,
}

// ---------------------------------------------------------------------------
// RegistryBuilder / Registration
// ---------------------------------------------------------------------------

/// Collects registrations in order; [`build`](Self::build) freezes them.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    infos: Vec<ComponentTypeInfo>,
    by_name: HashMap<String, TypeIndex>,
    by_type: HashMap<TypeId, TypeIndex>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under its short Rust type name.
    pub fn register<T: Component + Default>(&mut self) -> Registration<'_, T> {
        let name = short_type_name(std::any::type_name::<T>());
        self.register_named::<T>(name)
    }

    /// Register `T` under a custom display name.
    ///
    /// # Panics
    ///
    /// Panics if `T` or `name` is already registered.
    pub fn register_named<T: Component + Default>(&mut self, name: &str) -> Registration<'_, T> {
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.by_type.get(&type_id) {
            panic!(
                "component type {} is already registered as '{}'",
                std::any::type_name::<T>(),
                self.infos[existing.index()].name
            );
        }
        if self.by_name.contains_key(name) {
            panic!("component name '{name}' is already registered for a different type");
        }

        let index = TypeIndex(self.infos.len() as u32);
        self.infos.push(ComponentTypeInfo {
            index,
            name: name.to_owned(),
            rust_type_name: std::any::type_name::<T>(),
            type_id,
            ui_visible: true,
            ui_add_remove_reset_disabled: false,
            callbacks: ComponentCallbacks::new::<T>(),
        });
        self.by_name.insert(name.to_owned(), index);
        self.by_type.insert(type_id, index);
        tracing::trace!(component = name, index = index.0, "component type registered");

        Registration {
            info: &mut self.infos[index.index()],
            _marker: PhantomData,
        }
    }

    /// Freeze the registrations. No kinds can be added afterwards.
    pub fn build(self) -> ComponentTypeRegistry {
        tracing::debug!(type_count = self.infos.len(), "component type registry built");
        ComponentTypeRegistry {
            infos: self.infos,
            by_name: self.by_name,
            by_type: self.by_type,
        }
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Capability opt-in for a kind being registered.
///
/// Each method is only available when `T` implements the matching capability
/// trait.
pub struct Registration<'a, T> {
    info: &'a mut ComponentTypeInfo,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component + Default> Registration<'_, T> {
    /// The index assigned to this kind.
    pub fn index(&self) -> TypeIndex {
        self.info.index
    }

    pub fn serializer(self) -> Self
    where
        T: SerializeComponent,
    {
        self.info.callbacks.serialize = Some(serialize_component::<T>);
        self
    }

    pub fn validate(self) -> Self
    where
        T: ValidateComponent,
    {
        self.info.callbacks.validate = Some(T::validate);
        self
    }

    pub fn list_references(self) -> Self
    where
        T: ListReferences,
    {
        self.info.callbacks.list_references = Some(list_component_references::<T>);
        self
    }

    pub fn reset(self) -> Self
    where
        T: ResetComponent,
    {
        self.info.callbacks.reset = Some(reset_component::<T>);
        self
    }

    pub fn ui_tick(self) -> Self
    where
        T: UiTickComponent,
    {
        self.info.callbacks.ui_tick = Some(ui_tick_component::<T>);
        self
    }

    pub fn ui_draw(self) -> Self
    where
        T: UiDrawComponent,
    {
        self.info.callbacks.ui_draw = Some(ui_draw_component::<T>);
        self
    }

    pub fn ui_type_info(self) -> Self
    where
        T: UiTypeInfo,
    {
        self.info.callbacks.ui_type_info = Some(T::ui_type_info);
        self
    }

    /// Hide the kind from property panels.
    pub fn ui_hidden(self) -> Self {
        self.info.ui_visible = false;
        self
    }

    /// Show the kind in property panels but forbid adding, removing or
    /// resetting it from there.
    pub fn ui_add_remove_reset_disabled(self) -> Self {
        self.info.ui_add_remove_reset_disabled = true;
        self
    }
}

// ---------------------------------------------------------------------------
// ComponentTypeRegistry
// ---------------------------------------------------------------------------

/// Frozen catalog of component kinds with type-erased dispatch.
#[derive(Debug)]
pub struct ComponentTypeRegistry {
    infos: Vec<ComponentTypeInfo>,
    by_name: HashMap<String, TypeIndex>,
    by_type: HashMap<TypeId, TypeIndex>,
}

impl ComponentTypeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    // -- lookups ------------------------------------------------------------

    /// Index of the kind registered under `name`.
    pub fn type_index(&self, name: &str) -> Option<TypeIndex> {
        self.by_name.get(name).copied()
    }

    /// Index of the kind registered for Rust type `T`.
    pub fn type_index_of<T: 'static>(&self) -> Option<TypeIndex> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    pub fn type_count(&self) -> usize {
        self.infos.len()
    }

    /// Every index, in registration order.
    pub fn indices(&self) -> impl Iterator<Item = TypeIndex> + '_ {
        self.infos.iter().map(|info| info.index)
    }

    pub fn info(&self, index: TypeIndex) -> &ComponentTypeInfo {
        match self.infos.get(index.index()) {
            Some(info) => info,
            None => panic!(
                "component type index {index} out of range (type count {})",
                self.infos.len()
            ),
        }
    }

    pub fn type_name(&self, index: TypeIndex) -> &str {
        &self.info(index).name
    }

    pub fn rust_type_name(&self, index: TypeIndex) -> &'static str {
        self.info(index).rust_type_name
    }

    pub fn ui_visible(&self, index: TypeIndex) -> bool {
        self.info(index).ui_visible
    }

    pub fn ui_add_remove_reset_disabled(&self, index: TypeIndex) -> bool {
        self.info(index).ui_add_remove_reset_disabled
    }

    /// Registered names in registration order, comma separated.
    pub fn registered_names(&self) -> String {
        self.infos
            .iter()
            .map(|info| info.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Multi-line capability summary for diagnostics.
    pub fn detailed_type_info(&self, index: TypeIndex) -> String {
        let info = self.info(index);
        let callbacks = &info.callbacks;
        format!(
            "Component name:     {}\n\
             Rust type name:     {}, type index: {}\n\
             Visible in UI:      {}\n\
             UI edit disabled:   {}\n\
             Has serializer:     {}\n\
             Has UI handler:     {}\n\
             Has validator:      {}\n\
             Has references:     {}\n\
             Has custom reset:   {}",
            info.name,
            info.rust_type_name,
            info.index,
            info.ui_visible,
            info.ui_add_remove_reset_disabled,
            callbacks.serialize.is_some(),
            callbacks.ui_tick.is_some(),
            callbacks.validate.is_some(),
            callbacks.list_references.is_some(),
            callbacks.reset.is_some(),
        )
    }

    // -- always-available dispatch ------------------------------------------

    pub fn has(&self, index: TypeIndex, store: &EntityStore, entity: EntityHandle) -> bool {
        (self.info(index).callbacks.has)(store, entity)
    }

    /// Attach a default value, overwriting any existing one.
    pub fn emplace_or_replace(
        &self,
        index: TypeIndex,
        store: &mut EntityStore,
        entity: EntityHandle,
    ) -> Result<(), StoreError> {
        (self.info(index).callbacks.emplace_or_replace)(store, entity)
    }

    /// Detach the component. `Ok(false)` if it was not attached.
    pub fn remove(
        &self,
        index: TypeIndex,
        store: &mut EntityStore,
        entity: EntityHandle,
    ) -> Result<bool, StoreError> {
        (self.info(index).callbacks.remove)(store, entity)
    }

    /// Restore the component to its default state.
    ///
    /// Uses the kind's reset routine if registered, otherwise overwrites the
    /// value with `Default::default()`.
    pub fn reset(
        &self,
        index: TypeIndex,
        store: &mut EntityStore,
        entity: EntityHandle,
    ) -> Result<(), StoreError> {
        let callbacks = &self.info(index).callbacks;
        match callbacks.reset {
            Some(reset) => reset(store, entity),
            None => (callbacks.emplace_or_replace)(store, entity),
        }
    }

    /// Number of live values of the kind in `store`.
    pub fn type_use_count(&self, index: TypeIndex, store: &EntityStore) -> usize {
        (self.info(index).callbacks.total_count)(store)
    }

    // -- optional capabilities ----------------------------------------------

    pub fn has_serialize(&self, index: TypeIndex) -> bool {
        self.info(index).callbacks.serialize.is_some()
    }

    pub fn has_ui_tick(&self, index: TypeIndex) -> bool {
        self.info(index).callbacks.ui_tick.is_some()
    }

    pub fn has_ui_type_info(&self, index: TypeIndex) -> bool {
        self.info(index).callbacks.ui_type_info.is_some()
    }

    pub fn has_validate(&self, index: TypeIndex) -> bool {
        self.info(index).callbacks.validate.is_some()
    }

    pub fn has_list_references(&self, index: TypeIndex) -> bool {
        self.info(index).callbacks.list_references.is_some()
    }

    pub fn has_ui_draw(&self, index: TypeIndex) -> bool {
        self.info(index).callbacks.ui_draw.is_some()
    }

    /// Read or write the component through `serializer`. Returns `false` on
    /// failure.
    ///
    /// While reading, references are not resolved; they are queued into
    /// `args` for [`resolve_loaded_references`](crate::reference::resolve_loaded_references).
    pub fn serialize(
        &self,
        index: TypeIndex,
        store: &mut EntityStore,
        entity: EntityHandle,
        args: &mut SerializeArgs,
        serializer: &mut Serializer,
    ) -> bool {
        let serialize = self.capability(index, "serialize", |c| c.serialize);
        serialize(store, entity, index, args, serializer)
    }

    pub fn ui_tick(
        &self,
        index: TypeIndex,
        store: &mut EntityStore,
        entity: EntityHandle,
        args: &mut UiArgs<'_>,
    ) {
        let ui_tick = self.capability(index, "ui_tick", |c| c.ui_tick);
        ui_tick(store, entity, args)
    }

    pub fn ui_type_info(&self, index: TypeIndex) -> &'static str {
        let ui_type_info = self.capability(index, "ui_type_info", |c| c.ui_type_info);
        ui_type_info()
    }

    pub fn validate(&self, index: TypeIndex, store: &mut EntityStore, entity: EntityHandle) {
        let validate = self.capability(index, "validate", |c| c.validate);
        validate(store, entity)
    }

    /// Visit every [`EntityReference`] the component holds, in serialize order.
    pub fn list_references(
        &self,
        index: TypeIndex,
        store: &mut EntityStore,
        entity: EntityHandle,
        visit: &mut dyn FnMut(&mut EntityReference),
    ) {
        let list_references = self.capability(index, "list_references", |c| c.list_references);
        list_references(store, entity, visit)
    }

    pub fn ui_draw(
        &self,
        index: TypeIndex,
        store: &EntityStore,
        entity: EntityHandle,
        canvas_2d: &mut dyn DebugCanvas2D,
        canvas_3d: &mut dyn DebugCanvas3D,
    ) {
        let ui_draw = self.capability(index, "ui_draw", |c| c.ui_draw);
        ui_draw(store, entity, canvas_2d, canvas_3d)
    }

    fn capability<F>(
        &self,
        index: TypeIndex,
        capability: &str,
        select: impl FnOnce(&ComponentCallbacks) -> Option<F>,
    ) -> F {
        let info = self.info(index);
        match select(&info.callbacks) {
            Some(callback) => callback,
            None => panic!(
                "component type '{}' does not support {capability}",
                info.name
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
