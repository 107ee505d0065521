use std::any::Any;
use std::collections::HashMap;

use lodestar_events::{Category, Event, EventFilter, EventKind, EventPayload};
use tracing::debug;

use crate::context::ModuleContext;
use crate::module::Module;
use crate::settings::{IntSetting, Setting, Settings, StringSetting};
use crate::timer::TimerId;

/// Greets players announced in chat after a short delay
pub struct AutoGreet {
    settings: Settings,
    greeting: Setting<StringSetting>,
    trigger: Setting<StringSetting>,
    delay: Setting<IntSetting>,
    pending: HashMap<TimerId, String>,
}

impl AutoGreet {
    pub fn new() -> Self {
        let settings = Settings::new();
        let general = settings.group("General");
        let greeting = general.add(
            StringSetting::builder("greeting", "Welcome, {name}!")
                .description("{name} is replaced by the player's name")
                .max_len(100),
        );
        let trigger = general.add(
            StringSetting::builder("trigger", "joined the game")
                .description("Chat text announcing a player")
                .max_len(64),
        );
        let delay = general.add(
            IntSetting::builder("delay-ticks", 40)
                .description("Ticks to wait before greeting")
                .range(0, 1200),
        );

        Self {
            settings,
            greeting,
            trigger,
            delay,
            pending: HashMap::new(),
        }
    }

    /// Greetings waiting for their timer
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Default for AutoGreet {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for AutoGreet {
    fn category(&self) -> Category {
        Category::Misc
    }

    fn name(&self) -> &'static str {
        "auto-greet"
    }

    fn description(&self) -> &'static str {
        "Says hello to players joining the server"
    }

    fn settings(&self) -> Settings {
        self.settings.clone()
    }

    fn subscribed_events(&self) -> &[EventFilter] {
        &[EventFilter::Only(EventKind::ChatReceive)]
    }

    fn on_deactivate(&mut self, _ctx: &mut ModuleContext<'_>) {
        self.pending.clear();
    }

    fn on_event(&mut self, event: &Event, ctx: &mut ModuleContext<'_>) -> anyhow::Result<()> {
        let EventPayload::ChatReceive { message } = event.payload() else {
            return Ok(());
        };

        let trigger = self.trigger.get();
        if trigger.is_empty() || !message.contains(&trigger) {
            return Ok(());
        }
        let Some(name) = message.split_whitespace().next() else {
            return Ok(());
        };

        let own_name = ctx.snapshot().player.as_ref().map(|p| p.name.as_str());
        if own_name == Some(name) {
            return Ok(());
        }

        let delay = u64::try_from(self.delay.get()).unwrap_or(0);
        let timer = ctx.schedule_timer(delay, "greet");
        debug!(target: "modules", "Greeting {} in {} ticks", name, delay);
        self.pending.insert(timer, name.to_string());
        Ok(())
    }

    fn on_timer(&mut self, timer: TimerId, _name: &str, ctx: &mut ModuleContext<'_>) {
        if let Some(player) = self.pending.remove(&timer) {
            ctx.send_chat(self.greeting.get().replace("{name}", &player));
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use lodestar_events::{EventBus, HostAction, HostSnapshot, PlayerSnapshot, action_channel};

    use super::*;
    use crate::registry::ModuleRegistry;

    #[test]
    fn test_greets_after_delay() {
        let (tx, mut rx) = action_channel();
        let bus = EventBus::new();
        let registry = ModuleRegistry::new(bus.clone(), tx);
        let id = registry.register(Box::new(AutoGreet::new())).unwrap();
        registry
            .settings(&id)
            .unwrap()
            .set_from_str("delay-ticks", "2")
            .unwrap();
        registry.activate(&id).unwrap();

        bus.set_snapshot(HostSnapshot {
            player: Some(PlayerSnapshot {
                name: "steve".to_string(),
                ..PlayerSnapshot::default()
            }),
            ..HostSnapshot::default()
        });
        bus.emit(EventPayload::ChatReceive {
            message: "alex joined the game".to_string(),
        });
        bus.emit(EventPayload::ChatReceive {
            message: "steve joined the game".to_string(),
        });
        assert_eq!(registry.with_module(&id, AutoGreet::pending), Some(1));

        bus.emit(EventPayload::TickPre);
        assert!(rx.try_recv().is_err());
        bus.emit(EventPayload::TickPre);
        assert_eq!(
            rx.try_recv().unwrap(),
            HostAction::SendChat {
                message: "Welcome, alex!".to_string()
            }
        );
        assert_eq!(registry.with_module(&id, AutoGreet::pending), Some(0));
    }
}
