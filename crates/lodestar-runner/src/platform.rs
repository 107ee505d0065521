//! Assembly of the event bus, module registry and command processor
//!
//! ```no_run
//! use lodestar_modules::builtin;
//! use lodestar_runner::{HostAdapter, Platform};
//!
//! let platform = Platform::builder()
//!     .with_modules(builtin::all())
//!     .with_profile_path("profile.toml")
//!     .build()?;
//! let mut host = HostAdapter::new(platform);
//! host.tick_start();
//! host.tick_end();
//! host.shutdown();
//! # Ok::<(), lodestar_runner::BuildError>(())
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::{Path, PathBuf};

use lodestar_commands::{Command, CommandError, CommandProcessor};
use lodestar_config::LodestarConfig;
use lodestar_events::{
    ActionReceiver, ActionSender, EventBus, HostAction, SubscriptionId, action_channel,
};
use lodestar_modules::{Module, ModuleError, ModuleRegistry, Profile, ProfileError, ProfileWarning};
use tracing::{debug, error, info, warn};

use crate::builtin_commands;
use crate::control::{ControlMessage, ControlReceiver, RemoteHandle, control_channel};

/// Error during platform assembly
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("Failed to load profile {}: {source}", .path.display())]
    Profile {
        path: PathBuf,
        #[source]
        source: ProfileError,
    },
    #[error("Command prefix must not be empty")]
    EmptyPrefix,
}

/// Builder for [`Platform`]
pub struct PlatformBuilder {
    modules: Vec<Box<dyn Module>>,
    commands: Vec<Command>,
    config: LodestarConfig,
    profile_path: Option<PathBuf>,
    builtin_commands: bool,
}

impl Default for PlatformBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformBuilder {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            commands: Vec::new(),
            config: LodestarConfig::default(),
            profile_path: None,
            builtin_commands: true,
        }
    }

    pub fn with_module(mut self, module: impl Module) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn with_modules(mut self, modules: impl IntoIterator<Item = Box<dyn Module>>) -> Self {
        self.modules.extend(modules);
        self
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Use `config` for the command prefix, fault threshold and profile.
    /// A profile set in the config is used unless one is set on the builder.
    pub fn with_config(mut self, config: LodestarConfig) -> Self {
        self.config = config;
        self
    }

    /// Load module state from `path` on build and save it on shutdown
    pub fn with_profile_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_path = Some(path.into());
        self
    }

    /// Skip `help`, `modules`, `toggle` and the other built-in commands
    pub fn without_builtin_commands(mut self) -> Self {
        self.builtin_commands = false;
        self
    }

    /// Assemble the platform
    ///
    /// The bus comes first, then the registry with every module, then the
    /// saved profile is applied, and commands are installed last.
    pub fn build(self) -> Result<Platform, BuildError> {
        let config = self.config;
        let prefix = config.commands.prefix.trim().to_string();
        if prefix.is_empty() {
            return Err(BuildError::EmptyPrefix);
        }

        let bus = EventBus::with_fault_threshold(config.modules.fault_threshold);
        let (actions, action_rx) = action_channel();

        let registry = ModuleRegistry::new(bus.clone(), actions.clone());
        for module in self.modules {
            registry.register(module)?;
        }

        let profile_path = self.profile_path.or_else(|| config.modules.profile.clone());
        let profile_warnings = match &profile_path {
            Some(path) => match Profile::load(path) {
                Ok(Some(profile)) => profile.apply(&registry),
                Ok(None) => Vec::new(),
                Err(source) => {
                    return Err(BuildError::Profile {
                        path: path.clone(),
                        source,
                    });
                }
            },
            None => Vec::new(),
        };

        let commands = CommandProcessor::new();
        if self.builtin_commands {
            builtin_commands::register_all(&commands, &registry, profile_path.clone())?;
        }
        for command in self.commands {
            commands.register(command)?;
        }
        let chat_hook = commands.install_chat_hook(&bus, prefix, actions.clone());

        let (remote, control_rx) = control_channel();

        info!(
            target: "platform",
            "Platform ready: {} module(s), {} active, {} command(s)",
            registry.len(),
            registry.active_modules().len(),
            commands.commands().len()
        );

        Ok(Platform {
            bus,
            registry,
            commands,
            actions,
            action_rx: RefCell::new(Some(action_rx)),
            remote,
            control_rx: RefCell::new(control_rx),
            config,
            profile_path,
            profile_warnings,
            chat_hook,
            shut_down: Cell::new(false),
        })
    }
}

/// A fully assembled module platform
///
/// Owns every core component. All of them are `!Send`; other threads reach
/// the platform through [`Platform::remote`].
pub struct Platform {
    bus: EventBus,
    registry: ModuleRegistry,
    commands: CommandProcessor,
    actions: ActionSender,
    action_rx: RefCell<Option<ActionReceiver>>,
    remote: RemoteHandle,
    control_rx: RefCell<ControlReceiver>,
    config: LodestarConfig,
    profile_path: Option<PathBuf>,
    profile_warnings: Vec<ProfileWarning>,
    chat_hook: SubscriptionId,
    shut_down: Cell<bool>,
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("registry", &self.registry)
            .field("commands", &self.commands)
            .field("profile_path", &self.profile_path)
            .field("shut_down", &self.shut_down.get())
            .finish()
    }
}

impl Platform {
    pub fn builder() -> PlatformBuilder {
        PlatformBuilder::new()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn commands(&self) -> &CommandProcessor {
        &self.commands
    }

    pub fn config(&self) -> &LodestarConfig {
        &self.config
    }

    pub fn actions(&self) -> &ActionSender {
        &self.actions
    }

    /// Take the receiving end of the host action channel. Only the first call
    /// returns it.
    pub fn take_action_receiver(&self) -> Option<ActionReceiver> {
        self.action_rx.borrow_mut().take()
    }

    /// Handle for posting work from other threads
    pub fn remote(&self) -> RemoteHandle {
        self.remote.clone()
    }

    pub fn profile_path(&self) -> Option<&Path> {
        self.profile_path.as_deref()
    }

    /// Problems found while applying the profile during build
    pub fn profile_warnings(&self) -> &[ProfileWarning] {
        &self.profile_warnings
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.get()
    }

    /// Write the current module state to the profile file, if one is configured
    pub fn save_profile(&self) -> Result<Option<&Path>, ProfileError> {
        let Some(path) = self.profile_path.as_deref() else {
            return Ok(None);
        };
        Profile::capture(&self.registry).save(path)?;
        Ok(Some(path))
    }

    /// Apply everything posted through [`RemoteHandle`]s since the last call
    ///
    /// Queued events are only enqueued on the bus; they are delivered on the
    /// next [`EventBus::flush`].
    pub fn drain_control(&self) -> usize {
        let mut handled = 0;
        loop {
            // Release the receiver before running anything that may post again
            let message = self.control_rx.borrow_mut().try_recv();
            let Ok(message) = message else {
                break;
            };
            self.handle_control(message);
            handled += 1;
        }
        handled
    }

    fn handle_control(&self, message: ControlMessage) {
        debug!(target: "platform", "Control message: {:?}", message);
        let result = match message {
            ControlMessage::Activate(name) => self
                .registry
                .resolve(&name)
                .and_then(|id| self.registry.activate(&id))
                .map_err(anyhow::Error::from),
            ControlMessage::Deactivate(name) => self
                .registry
                .resolve(&name)
                .and_then(|id| self.registry.deactivate(&id))
                .map_err(anyhow::Error::from),
            ControlMessage::Toggle(name) => self
                .registry
                .resolve(&name)
                .and_then(|id| self.registry.toggle(&id))
                .map(|_| ())
                .map_err(anyhow::Error::from),
            ControlMessage::SetSetting {
                module,
                setting,
                value,
            } => self.set_setting(&module, &setting, &value),
            ControlMessage::RunCommand(line) => {
                let lines = match self.commands.execute(&line) {
                    Ok(execution) => execution.output,
                    Err(e) => vec![e.to_string()],
                };
                for message in lines {
                    self.show(message);
                }
                Ok(())
            }
            ControlMessage::QueueEvent(payload) => {
                self.bus.enqueue(self.bus.event(payload));
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(target: "platform", "Control message failed: {:#}", e);
            self.show(e.to_string());
        }
    }

    fn set_setting(&self, module: &str, setting: &str, value: &str) -> anyhow::Result<()> {
        let id = self.registry.resolve(module)?;
        self.registry.settings(&id)?.set_from_str(setting, value)?;
        Ok(())
    }

    fn show(&self, message: String) {
        if self.actions.send(HostAction::ShowMessage { message }).is_err() {
            debug!(target: "platform", "Host action receiver is gone");
        }
    }

    /// Save the profile (when autosave is on), deactivate every module and
    /// detach everything from the bus. Later calls do nothing.
    pub fn shutdown(&self) {
        if self.shut_down.replace(true) {
            return;
        }

        if self.config.modules.autosave {
            if let Err(e) = self.save_profile() {
                error!(target: "platform", "Failed to save profile: {}", e);
            }
        }

        self.bus.unsubscribe(self.chat_hook);
        self.registry.shutdown();
        self.bus.clear();
        info!(target: "platform", "Platform shut down");
    }
}
