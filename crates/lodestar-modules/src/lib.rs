//! Module platform for lodestar
//!
//! Modules are toggleable features that react to host events. This crate
//! holds the [`Module`] trait, the [`ModuleRegistry`] driving their
//! lifecycle, the typed [`settings`] engine and profile persistence.

pub mod builtin;
pub mod context;
pub mod error;
pub mod module;
pub mod profile;
pub mod registry;
pub mod settings;
pub mod timer;

pub use context::ModuleContext;
pub use error::ModuleError;
pub use module::{Module, ModuleInfo};
pub use profile::{ModuleRecord, PROFILE_FORMAT_VERSION, Profile, ProfileError, ProfileWarning};
pub use registry::ModuleRegistry;
pub use settings::{AnySetting, Setting, SettingError, SettingWarning, Settings, SettingsRecord};
pub use timer::{TimerId, TimerManager};
