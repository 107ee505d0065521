use std::any::Any;

use lodestar_events::{Category, Event, EventFilter, KeyCode, ModuleId, priority};

use crate::context::ModuleContext;
use crate::settings::Settings;
use crate::timer::TimerId;

/// A named, toggleable unit of behaviour
///
/// Modules are registered once and live for the lifetime of the registry.
/// While active, each filter in [`Module::subscribed_events`] is subscribed
/// on the event bus at [`Module::priority`]; while inactive, no handler of
/// the module runs.
pub trait Module: 'static {
    fn category(&self) -> Category;

    /// Name unique within the category, in kebab-case (e.g. "anti-spam")
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn id(&self) -> ModuleId {
        ModuleId::from_static(self.category(), self.name())
    }

    /// Modules that must be active before this one can activate
    fn dependencies(&self) -> &[ModuleId] {
        &[]
    }

    /// Modules that cannot be active at the same time as this one
    fn conflicts(&self) -> &[ModuleId] {
        &[]
    }

    /// Bus priority of this module's handlers
    fn priority(&self) -> i32 {
        priority::MEDIUM
    }

    /// Handle of this module's settings collection
    fn settings(&self) -> Settings {
        Settings::default()
    }

    /// Key that toggles the module until the user rebinds it
    fn default_keybind(&self) -> Option<KeyCode> {
        None
    }

    fn subscribed_events(&self) -> &[EventFilter];

    /// Whether events already cancelled by a higher-priority handler still reach this module
    fn receive_cancelled(&self) -> bool {
        false
    }

    /// Called before the module becomes active. Returning `Err` aborts the activation.
    fn on_activate(&mut self, _ctx: &mut ModuleContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the module stopped receiving events
    fn on_deactivate(&mut self, _ctx: &mut ModuleContext<'_>) {}

    /// Handle an event matching one of the subscribed filters
    fn on_event(&mut self, event: &Event, ctx: &mut ModuleContext<'_>) -> anyhow::Result<()>;

    /// Called when a timer scheduled through the context fires
    fn on_timer(&mut self, _timer: TimerId, _name: &str, _ctx: &mut ModuleContext<'_>) {}

    /// Allow downcasting to the concrete module type for state access
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Read-only description of a registered module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub id: ModuleId,
    pub description: &'static str,
    pub active: bool,
    pub keybind: Option<KeyCode>,
    pub dependencies: Vec<ModuleId>,
    pub conflicts: Vec<ModuleId>,
    pub setting_count: usize,
}
