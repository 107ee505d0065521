//! Commands every platform ships with

use std::path::PathBuf;

use anyhow::{Context, bail};
use lodestar_commands::{Argument, ArgumentType, Command, CommandError, CommandProcessor};
use lodestar_events::{Category, KeyCode};
use lodestar_modules::{ModuleRegistry, Profile};

pub(crate) fn register_all(
    commands: &CommandProcessor,
    registry: &ModuleRegistry,
    profile_path: Option<PathBuf>,
) -> Result<(), CommandError> {
    commands.register(help())?;
    commands.register(modules(registry.clone()))?;
    commands.register(toggle(registry.clone()))?;
    commands.register(settings(registry.clone()))?;
    commands.register(reset(registry.clone()))?;
    commands.register(bind(registry.clone()))?;
    commands.register(save(registry.clone(), profile_path))?;
    Ok(())
}

fn help() -> Command {
    Command::new("help", "List commands or show how to use one")
        .alias("?")
        .argument(Argument::word("command").optional())
        .executes(|invocation, ctx| {
            if let Some(name) = invocation.get_str("command") {
                let Some(usage) = ctx.processor().usage(name) else {
                    bail!("unknown command '{}'", name);
                };
                ctx.reply(usage);
                return Ok(());
            }

            for info in ctx.processor().commands() {
                ctx.reply(format!("{} - {}", info.usage, info.description));
            }
            Ok(())
        })
}

fn modules(registry: ModuleRegistry) -> Command {
    let categories = Category::ALL.iter().map(|c| c.to_string()).collect();
    Command::new("modules", "List modules and their state")
        .alias("list")
        .argument(Argument::new("category", ArgumentType::Choice(categories)).optional())
        .executes(move |invocation, ctx| {
            let category = invocation.get_str("category").and_then(Category::parse);
            let mut shown = 0;
            for info in registry.modules() {
                if category.is_some_and(|category| info.id.category() != category) {
                    continue;
                }
                let state = if info.active { "on" } else { "off" };
                let key = info.keybind.map(|key| format!(" [{}]", key)).unwrap_or_default();
                ctx.reply(format!("{} ({}){} - {}", info.id, state, key, info.description));
                shown += 1;
            }
            if shown == 0 {
                ctx.reply("No modules");
            }
            Ok(())
        })
}

fn toggle(registry: ModuleRegistry) -> Command {
    Command::new("toggle", "Turn a module on or off")
        .alias("t")
        .argument(Argument::word("module"))
        .executes(move |invocation, ctx| {
            let id = registry.resolve(invocation.get_str("module").unwrap_or_default())?;
            let active = registry.toggle(&id)?;
            ctx.reply(format!("{} {}", id, if active { "enabled" } else { "disabled" }));
            Ok(())
        })
}

fn settings(registry: ModuleRegistry) -> Command {
    Command::new("settings", "Show or change module settings")
        .alias("set")
        .argument(Argument::word("module"))
        .argument(Argument::word("setting").optional())
        .argument(Argument::greedy("value").optional())
        .executes(move |invocation, ctx| {
            let id = registry.resolve(invocation.get_str("module").unwrap_or_default())?;
            let settings = registry.settings(&id)?;

            let Some(name) = invocation.get_str("setting") else {
                if settings.is_empty() {
                    ctx.reply(format!("{} has no settings", id));
                }
                for setting in settings.visible() {
                    ctx.reply(format!(
                        "{} = {} ({})",
                        setting.name(),
                        setting.value_string(),
                        setting.describe()
                    ));
                }
                return Ok(());
            };

            let setting = settings
                .get(name)
                .with_context(|| format!("{} has no setting '{}'", id, name))?;
            if let Some(value) = invocation.get_str("value") {
                setting.set_from_str(value)?;
            }
            ctx.reply(format!("{} {} = {}", id, setting.name(), setting.value_string()));
            Ok(())
        })
}

fn reset(registry: ModuleRegistry) -> Command {
    Command::new("reset", "Restore default settings of a module")
        .argument(Argument::word("module"))
        .argument(Argument::word("setting").optional())
        .executes(move |invocation, ctx| {
            let id = registry.resolve(invocation.get_str("module").unwrap_or_default())?;
            let settings = registry.settings(&id)?;
            match invocation.get_str("setting") {
                Some(name) => {
                    settings.reset(name)?;
                    ctx.reply(format!("Reset {} {}", id, name));
                }
                None => {
                    settings.reset_all();
                    ctx.reply(format!("Reset all settings of {}", id));
                }
            }
            Ok(())
        })
}

fn bind(registry: ModuleRegistry) -> Command {
    Command::new("bind", "Show or change the key that toggles a module")
        .argument(Argument::word("module"))
        .argument(Argument::word("key").optional())
        .executes(move |invocation, ctx| {
            let id = registry.resolve(invocation.get_str("module").unwrap_or_default())?;
            match invocation.get_str("key") {
                None => match registry.keybind(&id) {
                    Some(key) => ctx.reply(format!("{} is bound to {}", id, key)),
                    None => ctx.reply(format!("{} is not bound", id)),
                },
                Some(text) if text.eq_ignore_ascii_case("none") => {
                    registry.bind(&id, None)?;
                    ctx.reply(format!("Unbound {}", id));
                }
                Some(text) => {
                    let key = KeyCode::parse(text)
                        .with_context(|| format!("'{}' is not a key", text))?;
                    registry.bind(&id, Some(key))?;
                    ctx.reply(format!("Bound {} to {}", id, key));
                }
            }
            Ok(())
        })
}

fn save(registry: ModuleRegistry, profile_path: Option<PathBuf>) -> Command {
    Command::new("save", "Write the current profile to disk").executes(move |_, ctx| {
        let Some(path) = &profile_path else {
            bail!("no profile file configured");
        };
        Profile::capture(&registry).save(path)?;
        ctx.reply(format!("Saved profile to {}", path.display()));
        Ok(())
    })
}
