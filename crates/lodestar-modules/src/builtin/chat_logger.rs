use std::any::Any;

use lodestar_events::{Category, Event, EventFilter, EventKind, EventPayload};
use tracing::info;

use crate::context::ModuleContext;
use crate::module::Module;
use crate::settings::{BoolSetting, IntSetting, Setting, Settings};

/// Writes chat traffic to the log
pub struct ChatLogger {
    settings: Settings,
    include_outgoing: Setting<BoolSetting>,
    max_length: Setting<IntSetting>,
    logged: usize,
}

impl ChatLogger {
    pub fn new() -> Self {
        let settings = Settings::new();
        let general = settings.group("General");
        let include_outgoing = general.add(
            BoolSetting::builder("include-outgoing", false)
                .description("Also log messages the player sends"),
        );
        let max_length = general.add(
            IntSetting::builder("max-length", 256)
                .description("Longer messages are truncated in the log")
                .range(16, 1024)
                .slider(16, 512),
        );

        Self {
            settings,
            include_outgoing,
            max_length,
            logged: 0,
        }
    }

    /// Messages logged since activation
    pub fn logged(&self) -> usize {
        self.logged
    }
}

impl Default for ChatLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for ChatLogger {
    fn category(&self) -> Category {
        Category::Misc
    }

    fn name(&self) -> &'static str {
        "chat-logger"
    }

    fn description(&self) -> &'static str {
        "Logs incoming and, optionally, outgoing chat"
    }

    fn settings(&self) -> Settings {
        self.settings.clone()
    }

    fn subscribed_events(&self) -> &[EventFilter] {
        &[
            EventFilter::Only(EventKind::ChatReceive),
            EventFilter::Only(EventKind::ChatSend),
        ]
    }

    fn on_activate(&mut self, _ctx: &mut ModuleContext<'_>) -> anyhow::Result<()> {
        self.logged = 0;
        Ok(())
    }

    fn on_event(&mut self, event: &Event, _ctx: &mut ModuleContext<'_>) -> anyhow::Result<()> {
        let (direction, message) = match event.payload() {
            EventPayload::ChatReceive { message } => ("<-", message),
            EventPayload::ChatSend { message } if self.include_outgoing.get() => ("->", message),
            _ => return Ok(()),
        };

        let max = usize::try_from(self.max_length.get()).unwrap_or(usize::MAX);
        let shown: String = message.chars().take(max).collect();
        let ellipsis = if shown.len() < message.len() { "..." } else { "" };
        info!(target: "chat", "{} {}{}", direction, shown, ellipsis);
        self.logged += 1;
        Ok(())
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
    use lodestar_events::{EventBus, action_channel};

    use super::*;
    use crate::registry::ModuleRegistry;

    #[test]
    fn test_outgoing_only_when_enabled() {
        let (tx, _rx) = action_channel();
        let bus = EventBus::new();
        let registry = ModuleRegistry::new(bus.clone(), tx);
        let id = registry.register(Box::new(ChatLogger::new())).unwrap();
        registry.activate(&id).unwrap();

        bus.emit(EventPayload::ChatReceive {
            message: "hello".to_string(),
        });
        bus.emit(EventPayload::ChatSend {
            message: "hi".to_string(),
        });
        assert_eq!(registry.with_module(&id, ChatLogger::logged), Some(1));

        registry
            .settings(&id)
            .unwrap()
            .set_from_str("include-outgoing", "true")
            .unwrap();
        bus.emit(EventPayload::ChatSend {
            message: "hi".to_string(),
        });
        assert_eq!(registry.with_module(&id, ChatLogger::logged), Some(2));
    }
}
