//! Persistence of module state
//!
//! A profile records, per module, whether it is active, its keybind and its
//! settings:
//!
//! ```toml
//! format_version = 1
//! saved_at = "2026-10-19T12:00:00+00:00"
//!
//! [modules."misc/anti-spam"]
//! active = true
//! keybind = "F6"
//!
//! [modules."misc/anti-spam".settings]
//! version = 1
//!
//! [modules."misc/anti-spam".settings.values]
//! mode = "both"
//! blocked-words = ["discord.gg"]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use lodestar_events::{KeyCode, ModuleId};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ModuleError;
use crate::registry::ModuleRegistry;
use crate::settings::{SettingWarning, SettingsRecord};

pub const PROFILE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("IO error on profile: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse profile: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize profile: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A problem found while applying a profile. Applying never fails as a whole.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileWarning {
    UnknownModule { key: String },
    Setting { module: ModuleId, warning: SettingWarning },
    InvalidKeybind { module: ModuleId, keybind: String },
    NotActivated { module: ModuleId, reason: String },
    /// A field of the wrong shape; its default was used instead
    InvalidEntry { key: String, reason: String },
    NewerFormat { found: u32, supported: u32 },
}

impl fmt::Display for ProfileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileWarning::UnknownModule { key } => {
                write!(f, "profile entry '{key}' does not match any module")
            }
            ProfileWarning::Setting { module, warning } => write!(f, "{module}: {warning}"),
            ProfileWarning::InvalidKeybind { module, keybind } => {
                write!(f, "{module}: '{keybind}' is not a key")
            }
            ProfileWarning::NotActivated { module, reason } => {
                write!(f, "{module} was not re-activated: {reason}")
            }
            ProfileWarning::InvalidEntry { key, reason } => {
                write!(f, "profile entry '{key}' ignored: {reason}")
            }
            ProfileWarning::NewerFormat { found, supported } => write!(
                f,
                "profile written by format {found}, this build reads up to {supported}"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModuleRecord {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keybind: Option<String>,
    pub settings: SettingsRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub format_version: u32,
    /// RFC 3339 time of the last save
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
    /// Keyed by `category/name`
    pub modules: BTreeMap<String, ModuleRecord>,
    /// Problems found by [`Profile::parse`], reported again by `apply`
    #[serde(skip)]
    decode_warnings: Vec<ProfileWarning>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            format_version: PROFILE_FORMAT_VERSION,
            saved_at: None,
            modules: BTreeMap::new(),
            decode_warnings: Vec::new(),
        }
    }
}

impl Profile {
    /// Record the current state of every registered module
    pub fn capture(registry: &ModuleRegistry) -> Self {
        let mut modules = BTreeMap::new();
        for info in registry.modules() {
            let settings = match registry.settings(&info.id) {
                Ok(settings) => settings.serialize(),
                Err(_) => SettingsRecord::default(),
            };
            modules.insert(
                info.id.key(),
                ModuleRecord {
                    active: info.active,
                    keybind: info.keybind.map(|key| key.to_string()),
                    settings,
                },
            );
        }

        Self {
            format_version: PROFILE_FORMAT_VERSION,
            saved_at: Some(chrono::Utc::now().to_rfc3339()),
            modules,
            decode_warnings: Vec::new(),
        }
    }

    /// Decode a profile from TOML text
    ///
    /// Only text that is not TOML at all is an error. Fields of the wrong type
    /// keep their defaults and come back as warnings from [`Profile::apply`].
    pub fn parse(text: &str) -> Result<Self, ProfileError> {
        let table: toml::Table = toml::from_str(text)?;
        let mut profile = Profile::default();
        let mut warnings = Vec::new();

        if let Some(value) = table.get("format_version") {
            match as_u32(value) {
                Some(version) => profile.format_version = version,
                None => warnings.push(wrong_type("format_version", "an integer", value)),
            }
        }
        match table.get("saved_at") {
            None => {}
            Some(toml::Value::String(saved_at)) => profile.saved_at = Some(saved_at.clone()),
            Some(value) => warnings.push(wrong_type("saved_at", "a string", value)),
        }
        match table.get("modules") {
            None => {}
            Some(toml::Value::Table(modules)) => {
                for (key, entry) in modules {
                    if let Some(record) = ModuleRecord::decode(key, entry, &mut warnings) {
                        profile.modules.insert(key.clone(), record);
                    }
                }
            }
            Some(value) => warnings.push(wrong_type("modules", "a table", value)),
        }

        profile.decode_warnings = warnings;
        Ok(profile)
    }

    /// Restore settings, keybinds and active modules
    ///
    /// Settings and keybinds are applied first. Modules are then activated in
    /// dependency order; modules whose activation still fails are reported.
    pub fn apply(&self, registry: &ModuleRegistry) -> Vec<ProfileWarning> {
        let mut warnings = self.decode_warnings.clone();
        if self.format_version > PROFILE_FORMAT_VERSION {
            warnings.push(ProfileWarning::NewerFormat {
                found: self.format_version,
                supported: PROFILE_FORMAT_VERSION,
            });
        }

        let mut pending = Vec::new();
        for (key, record) in &self.modules {
            let Some(id) = ModuleId::parse_key(key).filter(|id| registry.contains(id)) else {
                warnings.push(ProfileWarning::UnknownModule { key: key.clone() });
                continue;
            };

            if let Ok(settings) = registry.settings(&id) {
                warnings.extend(settings.deserialize(&record.settings).into_iter().map(
                    |warning| ProfileWarning::Setting {
                        module: id.clone(),
                        warning,
                    },
                ));
            }

            let keybind = match record.keybind.as_deref() {
                None => Ok(None),
                Some(text) => KeyCode::parse(text).map(Some).ok_or(text),
            };
            match keybind {
                Ok(key) => {
                    if let Err(e) = registry.bind(&id, key) {
                        debug!(target: "modules", "Profile: could not bind {}: {}", id, e);
                    }
                }
                Err(text) => warnings.push(ProfileWarning::InvalidKeybind {
                    module: id.clone(),
                    keybind: text.to_string(),
                }),
            }

            if record.active {
                pending.push(id);
            } else if let Err(e) = registry.deactivate(&id) {
                debug!(target: "modules", "Profile: could not deactivate {}: {}", id, e);
            }
        }

        // Repeat until no activation makes progress so dependencies come up first
        loop {
            let before = pending.len();
            let mut failed = Vec::new();
            for id in pending {
                match registry.activate(&id) {
                    Ok(()) => {}
                    Err(ModuleError::DependencyUnsatisfied { .. }) => failed.push(id),
                    Err(e) => warnings.push(ProfileWarning::NotActivated {
                        module: id,
                        reason: e.to_string(),
                    }),
                }
            }
            pending = failed;
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }

        for id in pending {
            let reason = match registry.activate(&id) {
                Err(e) => e.to_string(),
                Ok(()) => continue,
            };
            warnings.push(ProfileWarning::NotActivated { module: id, reason });
        }

        for warning in &warnings {
            warn!(target: "modules", "Profile: {}", warning);
        }
        warnings
    }

    /// Read a profile. A missing file yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>, ProfileError> {
        if !path.exists() {
            debug!(target: "modules", "No profile at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path)?;
        let profile = Self::parse(&content)?;
        info!(target: "modules", "Loaded profile from {}", path.display());
        Ok(Some(profile))
    }

    /// Write the profile, replacing any previous file in one step
    pub fn save(&self, path: &Path) -> Result<(), ProfileError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let content = toml::to_string_pretty(self)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(content.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        info!(target: "modules", "Saved profile to {}", path.display());
        Ok(())
    }
}

impl ModuleRecord {
    fn decode(key: &str, entry: &toml::Value, warnings: &mut Vec<ProfileWarning>) -> Option<Self> {
        let Some(fields) = entry.as_table() else {
            warnings.push(wrong_type(key, "a table", entry));
            return None;
        };

        let mut record = ModuleRecord::default();
        match fields.get("active") {
            None => {}
            Some(toml::Value::Boolean(active)) => record.active = *active,
            Some(value) => warnings.push(wrong_type(&format!("{key}.active"), "a boolean", value)),
        }
        match fields.get("keybind") {
            None => {}
            Some(toml::Value::String(keybind)) => record.keybind = Some(keybind.clone()),
            Some(value) => warnings.push(wrong_type(&format!("{key}.keybind"), "a string", value)),
        }
        if let Some(value) = fields.get("settings") {
            let (settings, setting_warnings) = SettingsRecord::decode(value);
            record.settings = settings;
            // Entries that are not module keys are reported as unknown modules on apply
            if let Some(module) = ModuleId::parse_key(key) {
                warnings.extend(setting_warnings.into_iter().map(|warning| {
                    ProfileWarning::Setting {
                        module: module.clone(),
                        warning,
                    }
                }));
            }
        }
        Some(record)
    }
}

fn as_u32(value: &toml::Value) -> Option<u32> {
    value.as_integer().and_then(|v| u32::try_from(v).ok())
}

fn wrong_type(key: &str, expected: &str, found: &toml::Value) -> ProfileWarning {
    ProfileWarning::InvalidEntry {
        key: key.to_string(),
        reason: format!("expected {expected}, found {}", found.type_str()),
    }
}

#[cfg(test)]
mod tests {
    use lodestar_events::{EventBus, HostSnapshot, action_channel};

    use super::*;
    use crate::builtin;

    fn registry() -> ModuleRegistry {
        let (tx, _rx) = action_channel();
        let registry = ModuleRegistry::new(EventBus::new(), tx);
        for module in builtin::all() {
            registry.register(module).unwrap();
        }
        registry
    }

    #[test]
    fn test_save_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles").join("default.toml");

        let original = registry();
        let hud = original.resolve("route-hud").unwrap();
        let recorder = original.resolve("path-recorder").unwrap();
        let spam = original.resolve("anti-spam").unwrap();
        original.activate(&recorder).unwrap();
        original.activate(&hud).unwrap();
        original.bind(&spam, Some(KeyCode::F(6))).unwrap();
        original
            .settings(&spam)
            .unwrap()
            .set_from_str("mode", "both")
            .unwrap();

        Profile::capture(&original).save(&path).unwrap();

        let restored = registry();
        let profile = Profile::load(&path).unwrap().unwrap();
        assert!(profile.saved_at.is_some());
        assert!(profile.apply(&restored).is_empty());

        assert_eq!(restored.active_modules(), vec![recorder, hud]);
        assert_eq!(restored.keybind(&spam), Some(KeyCode::F(6)));
        let mode = restored.settings(&spam).unwrap().get("mode").unwrap();
        assert_eq!(mode.value_string(), "both");
    }

    #[test]
    fn test_dependents_listed_first_still_activate() {
        // BTreeMap order puts render/route-hud before world/path-recorder
        let profile = Profile::parse(
            r#"
[modules."render/route-hud"]
active = true

[modules."world/path-recorder"]
active = true
"#,
        )
        .unwrap();

        let registry = registry();
        assert!(profile.apply(&registry).is_empty());
        assert_eq!(registry.active_modules().len(), 2);
    }

    #[test]
    fn test_apply_reports_problems() {
        let profile = Profile::parse(
            r#"
format_version = 1

[modules."misc/gone"]
active = true

[modules."misc/anti-spam"]
active = false
keybind = "NotAKey"

[modules."misc/anti-spam".settings.values]
mode = "fast"

[modules."render/freecam"]
active = true

[modules."world/path-recorder"]
active = true
"#,
        )
        .unwrap();

        let registry = registry();
        registry.bus().set_snapshot(HostSnapshot {
            in_world: true,
            ..HostSnapshot::default()
        });
        let warnings = profile.apply(&registry);

        assert!(warnings.contains(&ProfileWarning::UnknownModule {
            key: "misc/gone".to_string()
        }));
        assert!(warnings.iter().any(|w| matches!(w, ProfileWarning::InvalidKeybind { keybind, .. } if keybind == "NotAKey")));
        assert!(warnings.iter().any(|w| matches!(
            w,
            ProfileWarning::Setting {
                warning: SettingWarning::InvalidValue { .. },
                ..
            }
        )));
        // freecam and path-recorder conflict; the first applied wins
        assert!(warnings.iter().any(|w| matches!(
            w,
            ProfileWarning::NotActivated { module, .. } if module.name() == "path-recorder"
        )));
        assert_eq!(registry.active_modules(), vec![registry.resolve("freecam").unwrap()]);
    }

    #[test]
    fn test_mistyped_entries_fall_back_to_defaults() {
        let profile = Profile::parse(
            r#"
format_version = 1

[modules."misc/anti-spam"]
active = "yes"
keybind = 6

[modules."misc/anti-spam".settings]
version = "two"

[modules."misc/anti-spam".settings.values]
mode = "both"

[modules."misc/chat-logger"]
active = true
keybind = "L"

[modules."world/path-recorder"]
active = true

[modules."world/path-recorder".settings]
version = 1
values = "interval"
"#,
        )
        .unwrap();

        let registry = registry();
        let spam = registry.resolve("anti-spam").unwrap();
        let logger = registry.resolve("chat-logger").unwrap();
        let recorder = registry.resolve("path-recorder").unwrap();
        let warnings = profile.apply(&registry);

        let keys: Vec<&str> = warnings
            .iter()
            .filter_map(|w| match w {
                ProfileWarning::InvalidEntry { key, .. } => Some(key.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec!["misc/anti-spam.active", "misc/anti-spam.keybind"]);
        assert!(warnings.iter().any(|w| matches!(
            w,
            ProfileWarning::Setting { module, warning: SettingWarning::TypeMismatch { key, .. } }
                if *module == spam && key == "version"
        )));
        assert!(warnings.iter().any(|w| matches!(
            w,
            ProfileWarning::Setting { module, warning: SettingWarning::TypeMismatch { key, .. } }
                if *module == recorder && key == "values"
        )));

        // The well-formed entries still restore
        assert_eq!(registry.active_modules(), vec![logger.clone(), recorder]);
        assert_eq!(registry.keybind(&logger), Some(KeyCode::Char('l')));
        assert!(!registry.is_active(&spam));
        assert_eq!(registry.keybind(&spam), None);
    }

    #[test]
    fn test_non_table_module_entry_is_skipped() {
        let profile = Profile::parse(
            r#"
format_version = "one"
modules = { "misc/chat-logger" = true, "misc/anti-spam" = { active = true } }
"#,
        )
        .unwrap();
        assert_eq!(profile.format_version, PROFILE_FORMAT_VERSION);
        assert_eq!(profile.modules.len(), 1);

        let registry = registry();
        let warnings = profile.apply(&registry);
        assert!(warnings.contains(&ProfileWarning::InvalidEntry {
            key: "format_version".to_string(),
            reason: "expected an integer, found string".to_string(),
        }));
        assert!(warnings.iter().any(
            |w| matches!(w, ProfileWarning::InvalidEntry { key, .. } if key == "misc/chat-logger")
        ));
        assert_eq!(registry.active_modules(), vec![registry.resolve("anti-spam").unwrap()]);
    }

    #[test]
    fn test_save_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.toml");
        fs::write(&path, "modules = [").unwrap();

        let registry = registry();
        registry.activate(&registry.resolve("chat-logger").unwrap()).unwrap();
        Profile::capture(&registry).save(&path).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "no temporary file is left behind");
        let profile = Profile::load(&path).unwrap().unwrap();
        assert!(profile.modules["misc/chat-logger"].active);
    }

    #[test]
    fn test_missing_profile() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Profile::load(&dir.path().join("none.toml")).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "modules = [").unwrap();
        assert!(matches!(Profile::load(&path), Err(ProfileError::Parse(_))));
    }
}
