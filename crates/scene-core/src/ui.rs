//! Tooling collaborators.
//!
//! The core never draws anything itself. Property panels and debug
//! visualization are supplied by the host through these traits, and the
//! registry routes each component kind's UI hooks to them.

/// Property-panel sink for one component.
///
/// Editing methods return `true` when the user changed the value.
pub trait ComponentUi {
    fn label(&mut self, text: &str);
    fn edit_text(&mut self, label: &str, value: &mut String) -> bool;
    fn edit_bool(&mut self, label: &str, value: &mut bool) -> bool;
    fn edit_f32(&mut self, label: &str, value: &mut f32) -> bool;
}

/// Arguments of a component's `ui_tick`.
pub struct UiArgs<'a> {
    ui: &'a mut dyn ComponentUi,
    /// Set by the component when any edit changed its value.
    pub modified: bool,
}

impl<'a> UiArgs<'a> {
    pub fn new(ui: &'a mut dyn ComponentUi) -> Self {
        Self { ui, modified: false }
    }

    pub fn ui(&mut self) -> &mut (dyn ComponentUi + 'a) {
        &mut *self.ui
    }
}

impl std::fmt::Debug for UiArgs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiArgs")
            .field("modified", &self.modified)
            .finish_non_exhaustive()
    }
}

/// Screen-space debug drawing.
pub trait DebugCanvas2D {
    fn draw_text(&mut self, position: [f32; 2], text: &str, color: [f32; 4]);
    fn draw_rectangle(&mut self, min: [f32; 2], max: [f32; 2], color: [f32; 4]);
}

/// World-space debug drawing.
pub trait DebugCanvas3D {
    fn draw_line(&mut self, from: [f32; 3], to: [f32; 3], color: [f32; 4]);
    fn draw_box(&mut self, min: [f32; 3], max: [f32; 3], color: [f32; 4]);
}
