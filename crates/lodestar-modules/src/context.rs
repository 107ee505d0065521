use std::cell::RefCell;
use std::sync::Arc;

use lodestar_events::{EventBus, HostAction, HostSnapshot, ModuleId, Packet};
use tracing::warn;

use crate::error::ModuleError;
use crate::registry::ModuleRegistry;
use crate::settings::Settings;
use crate::timer::{TimerId, TimerManager};

/// Context handed to module hooks for interacting with the host and registry
pub struct ModuleContext<'a> {
    id: &'a ModuleId,
    settings: &'a Settings,
    timers: &'a RefCell<TimerManager>,
    registry: &'a ModuleRegistry,
    snapshot: Arc<HostSnapshot>,
}

impl<'a> ModuleContext<'a> {
    pub(crate) fn new(
        id: &'a ModuleId,
        settings: &'a Settings,
        timers: &'a RefCell<TimerManager>,
        registry: &'a ModuleRegistry,
        snapshot: Arc<HostSnapshot>,
    ) -> Self {
        Self {
            id,
            settings,
            timers,
            registry,
            snapshot,
        }
    }

    /// Identity of the module this context belongs to
    pub fn id(&self) -> &ModuleId {
        self.id
    }

    /// Host state at the time of the current event
    pub fn snapshot(&self) -> &HostSnapshot {
        &self.snapshot
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    pub fn registry(&self) -> &ModuleRegistry {
        self.registry
    }

    pub fn bus(&self) -> &EventBus {
        self.registry.bus()
    }

    // ===== Host actions =====

    /// Send a chat message to the server
    pub fn send_chat(&self, message: impl Into<String>) {
        self.send_action(HostAction::SendChat {
            message: message.into(),
        });
    }

    /// Show a client-side message to the user
    pub fn show_message(&self, message: impl Into<String>) {
        self.send_action(HostAction::ShowMessage {
            message: message.into(),
        });
    }

    pub fn send_packet(&self, packet: Packet) {
        self.send_action(HostAction::SendPacket(packet));
    }

    pub fn send_action(&self, action: HostAction) {
        if self.registry.actions().send(action).is_err() {
            warn!(target: "modules", "{}: host action dropped, host is gone", self.id);
        }
    }

    // ===== Timers =====

    /// Schedule a one-shot timer firing after `delay_ticks` host ticks
    pub fn schedule_timer(&self, delay_ticks: u64, name: impl Into<String>) -> TimerId {
        self.timers.borrow_mut().schedule_timer(delay_ticks, name)
    }

    pub fn schedule_recurring(&self, interval_ticks: u64, name: impl Into<String>) -> TimerId {
        self.timers.borrow_mut().schedule_recurring(interval_ticks, name)
    }

    pub fn cancel_timer(&self, timer: TimerId) -> bool {
        self.timers.borrow_mut().cancel_timer(timer)
    }

    // ===== Registry =====

    /// Deactivate this module. The deactivation hook runs once the current
    /// hook has returned.
    pub fn deactivate_self(&self) -> Result<(), ModuleError> {
        self.registry.deactivate(self.id)
    }
}
