use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use lodestar_events::{
    ActionSender, Event, EventBus, EventFilter, EventHandler, EventKind, EventPayload, HostAction,
    KeyCode, KeyEventKind, ModuleId, SubscriptionId, panic_message, priority,
};
use tracing::{debug, error, info, warn};

use crate::context::ModuleContext;
use crate::error::ModuleError;
use crate::module::{Module, ModuleInfo};
use crate::settings::Settings;
use crate::timer::TimerManager;

/// Timers fire before any handler sees the tick
const TIMER_PRIORITY: i32 = i32::MAX;

const REGISTRY_OWNER: &str = "module-registry";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    Activate,
    Deactivate,
}

struct ModuleSlot {
    id: ModuleId,
    description: &'static str,
    dependencies: Vec<ModuleId>,
    conflicts: Vec<ModuleId>,
    priority: i32,
    filters: Vec<EventFilter>,
    receive_cancelled: bool,
    settings: Settings,
    module: RefCell<Box<dyn Module>>,
    active: Cell<bool>,
    /// Set while an activation or deactivation of this module is in progress
    transitioning: Cell<bool>,
    keybind: Cell<Option<KeyCode>>,
    subscriptions: RefCell<Vec<SubscriptionId>>,
    timers: RefCell<TimerManager>,
    /// Hooks requested while the module itself was running
    deferred: RefCell<VecDeque<Hook>>,
}

impl ModuleSlot {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: self.id.clone(),
            description: self.description,
            active: self.active.get(),
            keybind: self.keybind.get(),
            dependencies: self.dependencies.clone(),
            conflicts: self.conflicts.clone(),
            setting_count: self.settings.len(),
        }
    }
}

struct RegistryInner {
    bus: EventBus,
    actions: ActionSender,
    slots: RefCell<Vec<Rc<ModuleSlot>>>,
    system_subscriptions: RefCell<Vec<SubscriptionId>>,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        for id in self.system_subscriptions.get_mut().drain(..) {
            self.bus.unsubscribe(id);
        }
        for slot in self.slots.get_mut().iter() {
            for id in slot.subscriptions.borrow_mut().drain(..) {
                self.bus.unsubscribe(id);
            }
        }
    }
}

/// Owns every module and drives their lifecycle
///
/// Modules are looked up by [`ModuleId`] (or resolved from a user-typed name
/// with [`ModuleRegistry::resolve`]). Activation subscribes a module's
/// handlers on the bus, deactivation removes them, and each real transition
/// publishes one `ModuleStateChanged` event.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct ModuleRegistry {
    inner: Rc<RegistryInner>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.len())
            .field("active", &self.active_modules())
            .finish()
    }
}

/// Bus handler forwarding events to one module while it is active
struct ModuleHandler {
    slot: Weak<ModuleSlot>,
    registry: Weak<RegistryInner>,
}

impl EventHandler for ModuleHandler {
    fn handle(&mut self, event: &Event) -> anyhow::Result<()> {
        let (Some(slot), Some(inner)) = (self.slot.upgrade(), self.registry.upgrade()) else {
            return Ok(());
        };
        if !slot.active.get() || (event.is_cancelled() && !slot.receive_cancelled) {
            return Ok(());
        }

        let registry = ModuleRegistry { inner };
        let result = {
            // Another filter of the same module is further up the stack
            let Ok(mut module) = slot.module.try_borrow_mut() else {
                debug!(
                    target: "modules",
                    "{} is busy, skipping nested {} event",
                    slot.id,
                    event.kind()
                );
                return Ok(());
            };
            let mut ctx = ModuleContext::new(
                &slot.id,
                &slot.settings,
                &slot.timers,
                &registry,
                event.shared_snapshot(),
            );
            module.on_event(event, &mut ctx)
        };

        registry.run_deferred(&slot);
        result
    }
}

impl ModuleRegistry {
    pub fn new(bus: EventBus, actions: ActionSender) -> Self {
        let registry = Self {
            inner: Rc::new(RegistryInner {
                bus,
                actions,
                slots: RefCell::new(Vec::new()),
                system_subscriptions: RefCell::new(Vec::new()),
            }),
        };
        registry.install_system_handlers();
        registry
    }

    fn install_system_handlers(&self) {
        let weak = Rc::downgrade(&self.inner);
        let timers = self.inner.bus.subscribe_fn(
            EventKind::TickPre,
            TIMER_PRIORITY,
            REGISTRY_OWNER,
            move |_event| {
                if let Some(inner) = weak.upgrade() {
                    ModuleRegistry { inner }.run_timers();
                }
                Ok(())
            },
        );

        let weak = Rc::downgrade(&self.inner);
        let keybinds = self.inner.bus.subscribe_fn(
            EventKind::KeyInput,
            priority::LOW,
            REGISTRY_OWNER,
            move |event| {
                if let Some(inner) = weak.upgrade() {
                    ModuleRegistry { inner }.handle_keybind(event);
                }
                Ok(())
            },
        );

        self.inner
            .system_subscriptions
            .borrow_mut()
            .extend([timers, keybinds]);
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn actions(&self) -> &ActionSender {
        &self.inner.actions
    }

    // ===== Registration and lookup =====

    /// Take ownership of a module. Registered modules start inactive.
    pub fn register(&self, module: Box<dyn Module>) -> Result<ModuleId, ModuleError> {
        let id = module.id();
        let invalid = |reason: String| ModuleError::InvalidDeclaration {
            module: id.clone(),
            reason,
        };

        let name = id.name();
        if name.is_empty() || name.contains('/') || name.contains(char::is_whitespace) {
            return Err(invalid(format!("'{name}' is not a valid module name")));
        }

        let dependencies = module.dependencies().to_vec();
        let conflicts = module.conflicts().to_vec();
        if dependencies.contains(&id) {
            return Err(invalid("module depends on itself".to_string()));
        }
        if conflicts.contains(&id) {
            return Err(invalid("module conflicts with itself".to_string()));
        }
        if let Some(both) = dependencies.iter().find(|dep| conflicts.contains(dep)) {
            return Err(invalid(format!("{both} is both a dependency and a conflict")));
        }

        let settings = module.settings();
        let duplicates = settings.duplicate_names();
        if !duplicates.is_empty() {
            return Err(invalid(format!(
                "duplicate settings: {}",
                duplicates.join(", ")
            )));
        }

        if self.find(&id).is_some() {
            return Err(ModuleError::DuplicateName(id));
        }

        let slot = Rc::new(ModuleSlot {
            id: id.clone(),
            description: module.description(),
            dependencies,
            conflicts,
            priority: module.priority(),
            filters: module.subscribed_events().to_vec(),
            receive_cancelled: module.receive_cancelled(),
            settings,
            keybind: Cell::new(module.default_keybind()),
            module: RefCell::new(module),
            active: Cell::new(false),
            transitioning: Cell::new(false),
            subscriptions: RefCell::new(Vec::new()),
            timers: RefCell::new(TimerManager::new()),
            deferred: RefCell::new(VecDeque::new()),
        });

        self.inner.slots.borrow_mut().push(slot);
        info!(target: "modules", "Registered module {}", id);
        Ok(id)
    }

    fn find(&self, id: &ModuleId) -> Option<Rc<ModuleSlot>> {
        self.inner
            .slots
            .borrow()
            .iter()
            .find(|slot| slot.id == *id)
            .cloned()
    }

    fn slot(&self, id: &ModuleId) -> Result<Rc<ModuleSlot>, ModuleError> {
        self.find(id)
            .ok_or_else(|| ModuleError::UnknownModule(id.key()))
    }

    /// Resolve a user-typed module name
    ///
    /// Accepts `name` or `category/name`, ignoring case. A bare name that
    /// exists in several categories is ambiguous.
    pub fn resolve(&self, query: &str) -> Result<ModuleId, ModuleError> {
        let query = query.trim();
        let slots = self.inner.slots.borrow();

        if let Some((category, name)) = query.split_once('/') {
            return slots
                .iter()
                .find(|slot| {
                    slot.id.category().as_ref().eq_ignore_ascii_case(category)
                        && slot.id.name().eq_ignore_ascii_case(name)
                })
                .map(|slot| slot.id.clone())
                .ok_or_else(|| ModuleError::UnknownModule(query.to_string()));
        }

        let candidates: Vec<ModuleId> = slots
            .iter()
            .filter(|slot| slot.id.name().eq_ignore_ascii_case(query))
            .map(|slot| slot.id.clone())
            .collect();

        match candidates.as_slice() {
            [] => Err(ModuleError::UnknownModule(query.to_string())),
            [only] => Ok(only.clone()),
            _ => Err(ModuleError::AmbiguousName {
                name: query.to_string(),
                candidates,
            }),
        }
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.find(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered modules in registration order
    pub fn ids(&self) -> Vec<ModuleId> {
        self.inner
            .slots
            .borrow()
            .iter()
            .map(|slot| slot.id.clone())
            .collect()
    }

    pub fn modules(&self) -> Vec<ModuleInfo> {
        self.inner
            .slots
            .borrow()
            .iter()
            .map(|slot| slot.info())
            .collect()
    }

    pub fn info(&self, id: &ModuleId) -> Option<ModuleInfo> {
        self.find(id).map(|slot| slot.info())
    }

    pub fn settings(&self, id: &ModuleId) -> Result<Settings, ModuleError> {
        Ok(self.slot(id)?.settings.clone())
    }

    /// Borrow a module as its concrete type
    ///
    /// Returns `None` if the module is unknown, of another type, or currently
    /// running one of its own hooks.
    pub fn with_module<T: Module, R>(&self, id: &ModuleId, f: impl FnOnce(&T) -> R) -> Option<R> {
        let slot = self.find(id)?;
        let module = slot.module.try_borrow().ok()?;
        module.as_any().downcast_ref::<T>().map(f)
    }

    pub fn with_module_mut<T: Module, R>(
        &self,
        id: &ModuleId,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let slot = self.find(id)?;
        let mut module = slot.module.try_borrow_mut().ok()?;
        module.as_any_mut().downcast_mut::<T>().map(f)
    }

    // ===== State =====

    pub fn is_active(&self, id: &ModuleId) -> bool {
        self.find(id).is_some_and(|slot| slot.active.get())
    }

    pub fn active_modules(&self) -> Vec<ModuleId> {
        self.inner
            .slots
            .borrow()
            .iter()
            .filter(|slot| slot.active.get())
            .map(|slot| slot.id.clone())
            .collect()
    }

    /// Active and not on its way down
    fn is_settled_active(&self, id: &ModuleId) -> bool {
        self.find(id)
            .is_some_and(|slot| slot.active.get() && !slot.transitioning.get())
    }

    /// Activate a module. Activating an active module does nothing.
    ///
    /// Fails without changing any state if a dependency is inactive, an
    /// active module conflicts with it, or its activation hook fails.
    pub fn activate(&self, id: &ModuleId) -> Result<(), ModuleError> {
        let slot = self.slot(id)?;
        if slot.active.get() || slot.transitioning.get() {
            debug!(target: "modules", "{} is already active", id);
            return Ok(());
        }

        let missing: Vec<ModuleId> = slot
            .dependencies
            .iter()
            .filter(|dependency| !self.is_settled_active(dependency))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ModuleError::DependencyUnsatisfied {
                module: id.clone(),
                missing,
            });
        }

        let conflicting: Vec<ModuleId> = self
            .inner
            .slots
            .borrow()
            .iter()
            .filter(|other| {
                other.active.get()
                    && (slot.conflicts.contains(&other.id) || other.conflicts.contains(id))
            })
            .map(|other| other.id.clone())
            .collect();
        if !conflicting.is_empty() {
            return Err(ModuleError::Conflict {
                module: id.clone(),
                conflicting,
            });
        }

        slot.transitioning.set(true);
        let hook = self.run_hook(&slot, Hook::Activate);
        slot.transitioning.set(false);

        if let Err(reason) = hook {
            warn!(target: "modules", "{} failed to activate: {}", id, reason);
            return Err(ModuleError::ActivationFailed {
                module: id.clone(),
                reason,
            });
        }

        slot.active.set(true);
        self.subscribe_slot(&slot);
        info!(target: "modules", "Activated {}", id);
        self.inner.bus.emit(EventPayload::ModuleStateChanged {
            module: id.clone(),
            active: true,
        });
        Ok(())
    }

    /// Deactivate a module and, first, every active module depending on it
    ///
    /// Dependents are deactivated deepest first. Deactivating an inactive
    /// module does nothing.
    pub fn deactivate(&self, id: &ModuleId) -> Result<(), ModuleError> {
        let slot = self.slot(id)?;
        self.deactivate_slot(&slot, true);
        Ok(())
    }

    fn deactivate_slot(&self, slot: &Rc<ModuleSlot>, run_hook: bool) {
        if !slot.active.get() || slot.transitioning.get() {
            return;
        }
        slot.transitioning.set(true);

        let dependents: Vec<Rc<ModuleSlot>> = self
            .inner
            .slots
            .borrow()
            .iter()
            .filter(|other| other.active.get() && other.dependencies.contains(&slot.id))
            .cloned()
            .collect();
        for dependent in dependents {
            debug!(
                target: "modules",
                "Deactivating {} because it depends on {}",
                dependent.id,
                slot.id
            );
            self.deactivate_slot(&dependent, true);
        }

        slot.active.set(false);
        self.unsubscribe_slot(slot);
        slot.timers.borrow_mut().clear();

        if run_hook {
            if let Err(reason) = self.run_hook(slot, Hook::Deactivate) {
                warn!(target: "modules", "{} did not deactivate cleanly: {}", slot.id, reason);
            }
        }
        slot.transitioning.set(false);

        info!(target: "modules", "Deactivated {}", slot.id);
        self.inner.bus.emit(EventPayload::ModuleStateChanged {
            module: slot.id.clone(),
            active: false,
        });
    }

    /// Flip a module's state, returning the new state
    pub fn toggle(&self, id: &ModuleId) -> Result<bool, ModuleError> {
        if self.is_active(id) {
            self.deactivate(id)?;
            Ok(false)
        } else {
            self.activate(id)?;
            Ok(true)
        }
    }

    pub fn set_active(&self, id: &ModuleId, active: bool) -> Result<(), ModuleError> {
        if active {
            self.activate(id)
        } else {
            self.deactivate(id)
        }
    }

    /// Deactivate every module, last registered first
    pub fn deactivate_all(&self) {
        let slots: Vec<Rc<ModuleSlot>> = self.inner.slots.borrow().iter().rev().cloned().collect();
        for slot in slots {
            self.deactivate_slot(&slot, true);
        }
    }

    /// Deactivate everything and detach the registry from the bus
    pub fn shutdown(&self) {
        self.deactivate_all();
        for id in self.inner.system_subscriptions.borrow_mut().drain(..) {
            self.inner.bus.unsubscribe(id);
        }
        info!(target: "modules", "Module registry shut down");
    }

    // ===== Keybinds =====

    pub fn bind(&self, id: &ModuleId, key: Option<KeyCode>) -> Result<(), ModuleError> {
        let slot = self.slot(id)?;
        slot.keybind.set(key);
        match key {
            Some(key) => info!(target: "modules", "Bound {} to {}", id, key),
            None => info!(target: "modules", "Unbound {}", id),
        }
        Ok(())
    }

    pub fn keybind(&self, id: &ModuleId) -> Option<KeyCode> {
        self.find(id).and_then(|slot| slot.keybind.get())
    }

    fn handle_keybind(&self, event: &Event) {
        if event.is_cancelled() || event.snapshot().screen_open {
            return;
        }
        let EventPayload::KeyInput(key) = event.payload() else {
            return;
        };
        if key.kind != KeyEventKind::Press || key.modifiers.ctrl || key.modifiers.alt {
            return;
        }

        let bound: Vec<ModuleId> = self
            .inner
            .slots
            .borrow()
            .iter()
            .filter(|slot| slot.keybind.get() == Some(key.key))
            .map(|slot| slot.id.clone())
            .collect();

        for id in bound {
            match self.toggle(&id) {
                Ok(active) => {
                    debug!(target: "modules", "Keybind {} toggled {} to {}", key.key, id, active)
                }
                Err(e) => {
                    warn!(target: "modules", "Keybind {}: {}", key.key, e);
                    let _ = self.inner.actions.send(HostAction::ShowMessage {
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    // ===== Internals =====

    fn subscribe_slot(&self, slot: &Rc<ModuleSlot>) {
        let owner = slot.id.key();
        let mut subscriptions = slot.subscriptions.borrow_mut();
        for filter in &slot.filters {
            let handler = ModuleHandler {
                slot: Rc::downgrade(slot),
                registry: Rc::downgrade(&self.inner),
            };
            subscriptions.push(
                self.inner
                    .bus
                    .subscribe(*filter, slot.priority, owner.clone(), handler),
            );
        }
    }

    fn unsubscribe_slot(&self, slot: &ModuleSlot) {
        let subscriptions: Vec<SubscriptionId> = slot.subscriptions.borrow_mut().drain(..).collect();
        for id in subscriptions {
            self.inner.bus.unsubscribe(id);
        }
    }

    /// Run a lifecycle hook now, or queue it if the module is running
    fn run_hook(&self, slot: &ModuleSlot, hook: Hook) -> Result<(), String> {
        let Ok(mut module) = slot.module.try_borrow_mut() else {
            debug!(target: "modules", "{} is busy, deferring {:?} hook", slot.id, hook);
            slot.deferred.borrow_mut().push_back(hook);
            return Ok(());
        };

        let mut ctx = ModuleContext::new(
            &slot.id,
            &slot.settings,
            &slot.timers,
            self,
            self.inner.bus.snapshot(),
        );
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match hook {
            Hook::Activate => module
                .on_activate(&mut ctx)
                .map_err(|e| format!("{:#}", e)),
            Hook::Deactivate => {
                module.on_deactivate(&mut ctx);
                Ok(())
            }
        }));
        drop(ctx);
        drop(module);

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
        };
        // Timers left by a failed activation or a deactivation hook never fire
        if hook == Hook::Deactivate || result.is_err() {
            slot.timers.borrow_mut().clear();
        }
        result
    }

    fn run_deferred(&self, slot: &Rc<ModuleSlot>) {
        loop {
            if slot.module.try_borrow_mut().is_err() {
                return;
            }
            let Some(hook) = slot.deferred.borrow_mut().pop_front() else {
                return;
            };

            match (hook, self.run_hook(slot, hook)) {
                (_, Ok(())) => {}
                (Hook::Activate, Err(reason)) => {
                    warn!(target: "modules", "{} failed to activate: {}", slot.id, reason);
                    self.deactivate_slot(slot, false);
                }
                (Hook::Deactivate, Err(reason)) => {
                    warn!(target: "modules", "{} did not deactivate cleanly: {}", slot.id, reason);
                }
            }
        }
    }

    fn run_timers(&self) {
        let slots: Vec<Rc<ModuleSlot>> = self
            .inner
            .slots
            .borrow()
            .iter()
            .filter(|slot| slot.active.get())
            .cloned()
            .collect();

        for slot in slots {
            if !slot.active.get() {
                continue;
            }
            let fired = slot.timers.borrow_mut().tick();

            for (timer, name) in fired {
                if !slot.active.get() {
                    break;
                }
                let Ok(mut module) = slot.module.try_borrow_mut() else {
                    warn!(target: "modules", "{} is busy, timer '{}' skipped", slot.id, name);
                    continue;
                };
                let mut ctx = ModuleContext::new(
                    &slot.id,
                    &slot.settings,
                    &slot.timers,
                    self,
                    self.inner.bus.snapshot(),
                );
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    module.on_timer(timer, &name, &mut ctx)
                }));
                drop(ctx);
                drop(module);

                if let Err(payload) = outcome {
                    error!(
                        target: "modules",
                        "{} panicked in timer '{}': {}",
                        slot.id,
                        name,
                        panic_message(payload.as_ref())
                    );
                }
            }

            self.run_deferred(&slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use lodestar_events::{Category, HostSnapshot, KeyboardEvent, action_channel};

    use super::*;
    use crate::timer::TimerId;

    type Log = Rc<RefCell<Vec<String>>>;

    struct TestModule {
        category: Category,
        name: &'static str,
        dependencies: Vec<ModuleId>,
        conflicts: Vec<ModuleId>,
        filters: Vec<EventFilter>,
        log: Log,
        fail_activation: bool,
        deactivate_on_event: bool,
        panic_on_event: bool,
        timer_delay: Option<u64>,
        deactivation_timer: Option<u64>,
        sees_cancelled: bool,
    }

    impl TestModule {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                category: Category::Misc,
                name,
                dependencies: Vec::new(),
                conflicts: Vec::new(),
                filters: vec![EventKind::ChatReceive.into()],
                log: Rc::clone(log),
                fail_activation: false,
                deactivate_on_event: false,
                panic_on_event: false,
                timer_delay: None,
                deactivation_timer: None,
                sees_cancelled: false,
            }
        }

        fn depends_on(mut self, name: &'static str) -> Self {
            self.dependencies
                .push(ModuleId::from_static(Category::Misc, name));
            self
        }

        fn conflicts_with(mut self, name: &'static str) -> Self {
            self.conflicts.push(ModuleId::from_static(Category::Misc, name));
            self
        }

        fn record(&self, entry: String) {
            self.log.borrow_mut().push(entry);
        }
    }

    impl Module for TestModule {
        fn category(&self) -> Category {
            self.category
        }

        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "test module"
        }

        fn dependencies(&self) -> &[ModuleId] {
            &self.dependencies
        }

        fn conflicts(&self) -> &[ModuleId] {
            &self.conflicts
        }

        fn subscribed_events(&self) -> &[EventFilter] {
            &self.filters
        }

        fn receive_cancelled(&self) -> bool {
            self.sees_cancelled
        }

        fn on_activate(&mut self, ctx: &mut ModuleContext<'_>) -> anyhow::Result<()> {
            if let Some(delay) = self.timer_delay {
                ctx.schedule_timer(delay, "wake");
            }
            if self.fail_activation {
                anyhow::bail!("not today");
            }
            self.record(format!("activate {}", self.name));
            Ok(())
        }

        fn on_deactivate(&mut self, ctx: &mut ModuleContext<'_>) {
            if let Some(delay) = self.deactivation_timer {
                ctx.schedule_timer(delay, "late");
            }
            self.record(format!("deactivate {}", self.name));
        }

        fn on_event(&mut self, event: &Event, ctx: &mut ModuleContext<'_>) -> anyhow::Result<()> {
            if self.panic_on_event {
                panic!("module exploded");
            }
            self.record(format!("{} {}", self.name, event.kind()));
            if self.deactivate_on_event {
                ctx.deactivate_self()?;
                self.record(format!("{} handler done", self.name));
            }
            Ok(())
        }

        fn on_timer(&mut self, _timer: TimerId, name: &str, _ctx: &mut ModuleContext<'_>) {
            self.record(format!("{} timer {}", self.name, name));
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn misc(name: &'static str) -> ModuleId {
        ModuleId::from_static(Category::Misc, name)
    }

    fn registry() -> (ModuleRegistry, Log) {
        let (tx, _rx) = action_channel();
        (ModuleRegistry::new(EventBus::new(), tx), Rc::default())
    }

    fn state_changes(bus: &EventBus) -> Rc<RefCell<Vec<(String, bool)>>> {
        let seen: Rc<RefCell<Vec<(String, bool)>>> = Rc::default();
        let sink = Rc::clone(&seen);
        bus.subscribe_fn(
            EventKind::ModuleStateChanged,
            priority::MEDIUM,
            "test",
            move |event| {
                if let EventPayload::ModuleStateChanged { module, active } = event.payload() {
                    sink.borrow_mut().push((module.name().to_string(), *active));
                }
                Ok(())
            },
        );
        seen
    }

    fn chat(bus: &EventBus) {
        bus.emit(EventPayload::ChatReceive {
            message: "hi".to_string(),
        });
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let (registry, log) = registry();
        registry.register(Box::new(TestModule::new("a", &log))).unwrap();

        assert_eq!(
            registry.register(Box::new(TestModule::new("a", &log))),
            Err(ModuleError::DuplicateName(misc("a")))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_invalid_declarations() {
        let (registry, log) = registry();
        let err = registry
            .register(Box::new(TestModule::new("a", &log).depends_on("a")))
            .unwrap_err();
        assert!(matches!(err, ModuleError::InvalidDeclaration { .. }));

        let err = registry
            .register(Box::new(
                TestModule::new("b", &log).depends_on("c").conflicts_with("c"),
            ))
            .unwrap_err();
        assert!(matches!(err, ModuleError::InvalidDeclaration { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_activation_is_idempotent() {
        let (registry, log) = registry();
        let changes = state_changes(registry.bus());
        let id = registry.register(Box::new(TestModule::new("a", &log))).unwrap();

        registry.activate(&id).unwrap();
        registry.activate(&id).unwrap();
        assert!(registry.is_active(&id));
        assert_eq!(*changes.borrow(), vec![("a".to_string(), true)]);

        registry.deactivate(&id).unwrap();
        registry.deactivate(&id).unwrap();
        assert_eq!(changes.borrow().len(), 2);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_handlers_only_run_while_active() {
        let (registry, log) = registry();
        let id = registry.register(Box::new(TestModule::new("a", &log))).unwrap();

        chat(registry.bus());
        registry.activate(&id).unwrap();
        chat(registry.bus());
        registry.deactivate(&id).unwrap();
        chat(registry.bus());

        assert_eq!(
            *log.borrow(),
            vec!["activate a", "a chat-receive", "deactivate a"]
        );
    }

    #[test]
    fn test_missing_dependency_leaves_state_unchanged() {
        let (registry, log) = registry();
        let changes = state_changes(registry.bus());
        registry.register(Box::new(TestModule::new("base", &log))).unwrap();
        let hud = registry
            .register(Box::new(TestModule::new("hud", &log).depends_on("base")))
            .unwrap();

        assert_eq!(
            registry.activate(&hud),
            Err(ModuleError::DependencyUnsatisfied {
                module: hud.clone(),
                missing: vec![misc("base")],
            })
        );
        assert!(registry.active_modules().is_empty());
        assert!(changes.borrow().is_empty());
        assert!(log.borrow().is_empty());

        registry.activate(&misc("base")).unwrap();
        registry.activate(&hud).unwrap();
        assert_eq!(registry.active_modules(), vec![misc("base"), hud]);
    }

    #[test]
    fn test_conflicts_are_symmetric() {
        let (registry, log) = registry();
        let recorder = registry.register(Box::new(TestModule::new("recorder", &log))).unwrap();
        let freecam = registry
            .register(Box::new(TestModule::new("freecam", &log).conflicts_with("recorder")))
            .unwrap();

        registry.activate(&recorder).unwrap();
        assert!(matches!(
            registry.activate(&freecam),
            Err(ModuleError::Conflict { .. })
        ));

        registry.deactivate(&recorder).unwrap();
        registry.activate(&freecam).unwrap();
        assert_eq!(
            registry.activate(&recorder),
            Err(ModuleError::Conflict {
                module: recorder.clone(),
                conflicting: vec![freecam.clone()],
            })
        );
    }

    #[test]
    fn test_deactivation_cascades_deepest_first() {
        let (registry, log) = registry();
        let changes = state_changes(registry.bus());
        let a = registry.register(Box::new(TestModule::new("a", &log))).unwrap();
        let b = registry
            .register(Box::new(TestModule::new("b", &log).depends_on("a")))
            .unwrap();
        let c = registry
            .register(Box::new(TestModule::new("c", &log).depends_on("b")))
            .unwrap();
        for id in [&a, &b, &c] {
            registry.activate(id).unwrap();
        }
        log.borrow_mut().clear();
        changes.borrow_mut().clear();

        registry.deactivate(&a).unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["deactivate c", "deactivate b", "deactivate a"]
        );
        assert_eq!(
            *changes.borrow(),
            vec![
                ("c".to_string(), false),
                ("b".to_string(), false),
                ("a".to_string(), false)
            ]
        );
        assert!(registry.active_modules().is_empty());
    }

    #[test]
    fn test_failed_activation_rolls_back() {
        let (registry, log) = registry();
        let changes = state_changes(registry.bus());
        let mut module = TestModule::new("a", &log);
        module.fail_activation = true;
        let id = registry.register(Box::new(module)).unwrap();
        let subscribers = registry.bus().subscriber_count();

        let err = registry.activate(&id).unwrap_err();
        assert!(matches!(err, ModuleError::ActivationFailed { ref reason, .. } if reason == "not today"));
        assert!(!registry.is_active(&id));
        assert_eq!(registry.bus().subscriber_count(), subscribers);
        assert!(changes.borrow().is_empty());
    }

    #[test]
    fn test_self_deactivation_runs_hook_after_handler() {
        let (registry, log) = registry();
        let mut module = TestModule::new("a", &log);
        module.deactivate_on_event = true;
        let id = registry.register(Box::new(module)).unwrap();
        registry.activate(&id).unwrap();

        chat(registry.bus());
        chat(registry.bus());

        assert!(!registry.is_active(&id));
        assert_eq!(
            *log.borrow(),
            vec![
                "activate a",
                "a chat-receive",
                "a handler done",
                "deactivate a"
            ]
        );
    }

    #[test]
    fn test_panicking_module_does_not_break_others() {
        let (registry, log) = registry();
        let mut bad = TestModule::new("bad", &log);
        bad.panic_on_event = true;
        let bad = registry.register(Box::new(bad)).unwrap();
        let good = registry.register(Box::new(TestModule::new("good", &log))).unwrap();
        registry.activate(&bad).unwrap();
        registry.activate(&good).unwrap();

        chat(registry.bus());

        assert!(log.borrow().contains(&"good chat-receive".to_string()));
        let faults = registry.bus().drain_faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].owner, "misc/bad");
    }

    #[test]
    fn test_keybind_toggles_module() {
        let (registry, log) = registry();
        let id = registry.register(Box::new(TestModule::new("a", &log))).unwrap();
        registry.bind(&id, Some(KeyCode::F(6))).unwrap();
        let bus = registry.bus().clone();

        bus.emit(EventPayload::KeyInput(KeyboardEvent::key_press(KeyCode::F(6))));
        assert!(registry.is_active(&id));

        bus.emit(EventPayload::KeyInput(KeyboardEvent::key_press(KeyCode::F(7))));
        assert!(registry.is_active(&id));

        // typing into a screen does not toggle modules
        bus.set_snapshot(HostSnapshot {
            screen_open: true,
            ..HostSnapshot::default()
        });
        bus.emit(EventPayload::KeyInput(KeyboardEvent::key_press(KeyCode::F(6))));
        assert!(registry.is_active(&id));

        bus.set_snapshot(HostSnapshot::default());
        bus.emit(EventPayload::KeyInput(KeyboardEvent::key_press(KeyCode::F(6))));
        assert!(!registry.is_active(&id));

        registry.bind(&id, None).unwrap();
        bus.emit(EventPayload::KeyInput(KeyboardEvent::key_press(KeyCode::F(6))));
        assert!(!registry.is_active(&id));
    }

    #[test]
    fn test_timers_fire_on_ticks_while_active() {
        let (registry, log) = registry();
        let mut module = TestModule::new("a", &log);
        module.timer_delay = Some(2);
        let id = registry.register(Box::new(module)).unwrap();
        registry.activate(&id).unwrap();
        let bus = registry.bus().clone();

        bus.emit(EventPayload::TickPre);
        assert!(!log.borrow().contains(&"a timer wake".to_string()));
        bus.emit(EventPayload::TickPre);
        assert!(log.borrow().contains(&"a timer wake".to_string()));

        // timers do not survive deactivation
        registry.deactivate(&id).unwrap();
        registry.with_module_mut::<TestModule, _>(&id, |module| module.timer_delay = Some(1));
        registry.activate(&id).unwrap();
        registry.deactivate(&id).unwrap();
        log.borrow_mut().clear();
        bus.emit(EventPayload::TickPre);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_cancelled_events_skip_modules_unless_requested() {
        let (registry, log) = registry();
        let quiet = registry.register(Box::new(TestModule::new("quiet", &log))).unwrap();
        let mut watcher = TestModule::new("watcher", &log);
        watcher.sees_cancelled = true;
        let watcher = registry.register(Box::new(watcher)).unwrap();
        registry.activate(&quiet).unwrap();
        registry.activate(&watcher).unwrap();

        registry.bus().subscribe_fn(
            EventKind::ChatReceive,
            priority::HIGHEST,
            "filter",
            |event| {
                event.cancel();
                Ok(())
            },
        );
        chat(registry.bus());

        assert_eq!(
            *log.borrow(),
            vec!["activate quiet", "activate watcher", "watcher chat-receive"]
        );
    }

    #[test]
    fn test_failed_activation_drops_its_timers() {
        let (registry, log) = registry();
        let mut module = TestModule::new("a", &log);
        module.fail_activation = true;
        module.timer_delay = Some(1);
        let id = registry.register(Box::new(module)).unwrap();
        assert!(registry.activate(&id).is_err());

        registry.with_module_mut::<TestModule, _>(&id, |module| {
            module.fail_activation = false;
            module.timer_delay = None;
        });
        registry.activate(&id).unwrap();
        let bus = registry.bus().clone();
        bus.emit(EventPayload::TickPre);
        bus.emit(EventPayload::TickPre);
        assert!(!log.borrow().contains(&"a timer wake".to_string()));
    }

    #[test]
    fn test_timers_scheduled_while_deactivating_are_dropped() {
        let (registry, log) = registry();
        let mut module = TestModule::new("a", &log);
        module.deactivation_timer = Some(1);
        let id = registry.register(Box::new(module)).unwrap();
        registry.activate(&id).unwrap();
        registry.deactivate(&id).unwrap();

        registry.with_module_mut::<TestModule, _>(&id, |module| module.deactivation_timer = None);
        registry.activate(&id).unwrap();
        let bus = registry.bus().clone();
        bus.emit(EventPayload::TickPre);
        bus.emit(EventPayload::TickPre);
        assert!(!log.borrow().contains(&"a timer late".to_string()));
    }

    #[test]
    fn test_dependency_going_down_counts_as_missing() {
        let (registry, log) = registry();
        let base = registry.register(Box::new(TestModule::new("base", &log))).unwrap();
        let child = registry
            .register(Box::new(TestModule::new("child", &log).depends_on("base")))
            .unwrap();
        registry.activate(&base).unwrap();
        registry.activate(&child).unwrap();

        // Try to bring the dependent back while the cascade is running
        let retries: Rc<RefCell<Vec<bool>>> = Rc::default();
        let handle = registry.clone();
        let seen = Rc::clone(&retries);
        let watched = child.clone();
        registry.bus().subscribe_fn(
            EventKind::ModuleStateChanged,
            priority::MEDIUM,
            "test",
            move |event| {
                if let EventPayload::ModuleStateChanged { module, active: false } = event.payload() {
                    if *module == watched {
                        seen.borrow_mut().push(handle.activate(&watched).is_ok());
                    }
                }
                Ok(())
            },
        );

        registry.deactivate(&base).unwrap();
        assert_eq!(*retries.borrow(), vec![false]);
        assert!(!registry.is_active(&child));
        assert!(!registry.is_active(&base));
    }

    #[test]
    fn test_resolve_names() {
        let (registry, log) = registry();
        registry.register(Box::new(TestModule::new("freecam", &log))).unwrap();
        let mut render = TestModule::new("freecam", &log);
        render.category = Category::Render;
        registry.register(Box::new(render)).unwrap();
        registry.register(Box::new(TestModule::new("anti-spam", &log))).unwrap();

        assert_eq!(registry.resolve("Anti-Spam"), Ok(misc("anti-spam")));
        assert_eq!(
            registry.resolve("render/FREECAM"),
            Ok(ModuleId::from_static(Category::Render, "freecam"))
        );
        assert!(matches!(
            registry.resolve("freecam"),
            Err(ModuleError::AmbiguousName { ref candidates, .. }) if candidates.len() == 2
        ));
        assert_eq!(
            registry.resolve("nope"),
            Err(ModuleError::UnknownModule("nope".to_string()))
        );
    }

    #[test]
    fn test_with_module_downcasts() {
        let (registry, log) = registry();
        let id = registry.register(Box::new(TestModule::new("a", &log))).unwrap();

        assert_eq!(registry.with_module::<TestModule, _>(&id, |module| module.name), Some("a"));
        assert_eq!(registry.with_module::<TestModule, _>(&misc("b"), |module| module.name), None);
    }

    #[test]
    fn test_shutdown_deactivates_everything() {
        let (registry, log) = registry();
        let a = registry.register(Box::new(TestModule::new("a", &log))).unwrap();
        let b = registry
            .register(Box::new(TestModule::new("b", &log).depends_on("a")))
            .unwrap();
        registry.activate(&a).unwrap();
        registry.activate(&b).unwrap();

        registry.shutdown();
        assert!(registry.active_modules().is_empty());
        assert_eq!(registry.bus().subscriber_count(), 0);
    }
}
