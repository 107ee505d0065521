use std::any::Any;
use std::collections::VecDeque;

use lodestar_events::{Category, Event, EventFilter, EventKind, EventPayload, priority};
use tracing::debug;

use crate::context::ModuleContext;
use crate::module::Module;
use crate::settings::{BoolSetting, EnumSetting, IntSetting, Setting, Settings, StringListSetting};

const HISTORY: usize = 20;

/// Hides incoming chat that contains blocked words or repeats too often
pub struct AntiSpam {
    settings: Settings,
    mode: Setting<EnumSetting>,
    blocked_words: Setting<StringListSetting>,
    ignore_case: Setting<BoolSetting>,
    repeat_limit: Setting<IntSetting>,
    recent: VecDeque<String>,
    blocked: usize,
}

impl AntiSpam {
    pub fn new() -> Self {
        let settings = Settings::new();
        let general = settings.group("General");
        let mode = general.add(
            EnumSetting::builder("mode", &["words", "repeats", "both"], "words")
                .description("What counts as spam"),
        );

        let filters = settings.group("Filters");
        let blocked_words = filters.add(
            StringListSetting::builder("blocked-words", &["discord.gg", "free coins"])
                .description("Messages containing any of these are hidden")
                .visible({
                    let mode = mode.clone();
                    move || mode.get() != "repeats"
                }),
        );
        let ignore_case = filters.add(
            BoolSetting::builder("ignore-case", true).visible({
                let mode = mode.clone();
                move || mode.get() != "repeats"
            }),
        );
        let repeat_limit = filters.add(
            IntSetting::builder("repeat-limit", 3)
                .description("Identical messages allowed within the last 20")
                .range(2, 20)
                .visible({
                    let mode = mode.clone();
                    move || mode.get() != "words"
                }),
        );

        Self {
            settings,
            mode,
            blocked_words,
            ignore_case,
            repeat_limit,
            recent: VecDeque::with_capacity(HISTORY),
            blocked: 0,
        }
    }

    /// Messages hidden since activation
    pub fn blocked(&self) -> usize {
        self.blocked
    }

    fn contains_blocked_word(&self, message: &str) -> bool {
        let ignore_case = self.ignore_case.get();
        let message = if ignore_case {
            message.to_lowercase()
        } else {
            message.to_string()
        };

        self.blocked_words.with(|words| {
            words.iter().any(|word| {
                if ignore_case {
                    message.contains(&word.to_lowercase())
                } else {
                    message.contains(word.as_str())
                }
            })
        })
    }

    /// Record the message and report whether it exceeded the repeat limit
    fn is_repeated(&mut self, message: &str) -> bool {
        let normalized = message.trim().to_lowercase();
        let seen = self.recent.iter().filter(|m| **m == normalized).count();

        if self.recent.len() == HISTORY {
            self.recent.pop_front();
        }
        self.recent.push_back(normalized);

        let limit = usize::try_from(self.repeat_limit.get()).unwrap_or(usize::MAX);
        seen >= limit
    }
}

impl Default for AntiSpam {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for AntiSpam {
    fn category(&self) -> Category {
        Category::Misc
    }

    fn name(&self) -> &'static str {
        "anti-spam"
    }

    fn description(&self) -> &'static str {
        "Hides spam from incoming chat"
    }

    fn priority(&self) -> i32 {
        priority::HIGH
    }

    fn settings(&self) -> Settings {
        self.settings.clone()
    }

    fn subscribed_events(&self) -> &[EventFilter] {
        &[EventFilter::Only(EventKind::ChatReceive)]
    }

    fn on_activate(&mut self, _ctx: &mut ModuleContext<'_>) -> anyhow::Result<()> {
        self.recent.clear();
        self.blocked = 0;
        Ok(())
    }

    fn on_event(&mut self, event: &Event, _ctx: &mut ModuleContext<'_>) -> anyhow::Result<()> {
        let EventPayload::ChatReceive { message } = event.payload() else {
            return Ok(());
        };

        let mode = self.mode.get();
        let by_word = mode != "repeats" && self.contains_blocked_word(message);
        let by_repeat = mode != "words" && self.is_repeated(message);

        if by_word || by_repeat {
            event.cancel();
            self.blocked += 1;
            debug!(target: "modules", "anti-spam hid: {}", message);
        }
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

    fn receive(bus: &EventBus, message: &str) -> bool {
        bus.emit(EventPayload::ChatReceive {
            message: message.to_string(),
        })
        .is_cancelled()
    }

    fn setup() -> (EventBus, ModuleRegistry, lodestar_events::ModuleId) {
        let (tx, _rx) = action_channel();
        let bus = EventBus::new();
        let registry = ModuleRegistry::new(bus.clone(), tx);
        let id = registry.register(Box::new(AntiSpam::new())).unwrap();
        registry.activate(&id).unwrap();
        (bus, registry, id)
    }

    #[test]
    fn test_blocks_words_ignoring_case() {
        let (bus, registry, id) = setup();

        assert!(receive(&bus, "join DISCORD.GG/abc"));
        assert!(!receive(&bus, "good morning"));
        assert_eq!(registry.with_module(&id, AntiSpam::blocked), Some(1));
    }

    #[test]
    fn test_repeat_mode() {
        let (bus, registry, id) = setup();
        let settings = registry.settings(&id).unwrap();
        settings.set_from_str("mode", "Repeats").unwrap();
        settings.set_from_str("repeat-limit", "2").unwrap();

        // words are not checked in repeat mode
        assert!(!receive(&bus, "free coins"));
        assert!(!receive(&bus, "buy now"));
        assert!(!receive(&bus, "buy now"));
        assert!(receive(&bus, "Buy now"));
    }

    #[test]
    fn test_visibility_depends_on_mode() {
        let module = AntiSpam::new();
        let visible = |module: &AntiSpam| -> Vec<String> {
            module
                .settings
                .visible()
                .iter()
                .map(|s| s.name().to_string())
                .collect()
        };

        assert_eq!(
            visible(&module),
            vec!["mode", "blocked-words", "ignore-case"]
        );
        module.mode.set("repeats".to_string()).unwrap();
        assert_eq!(visible(&module), vec!["mode", "repeat-limit"]);
    }
}
