//! Typed module settings
//!
//! Each module owns a [`Settings`] collection made of named groups. Settings
//! are declared through builders and handed back as [`Setting`] handles:
//!
//! ```
//! use lodestar_modules::settings::{IntSetting, Settings};
//!
//! let settings = Settings::new();
//! let general = settings.group("General");
//! let radius = general.add(IntSetting::builder("radius", 4).range(1, 8));
//!
//! radius.set(20).unwrap();
//! assert_eq!(radius.get(), 8);
//! ```

mod kinds;
mod setting;

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub use kinds::{
    BoolSetting, Color, ColorSetting, DoubleSetting, EnumSetting, IntSetting, StringListSetting,
    StringSetting,
};
pub use setting::{AnySetting, Setting, SettingBuilder, SettingKind};

/// Version written into every [`SettingsRecord`]
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingError {
    #[error("invalid value for '{setting}': {reason}")]
    InvalidValue { setting: String, reason: String },
    #[error("no setting named '{0}'")]
    UnknownSetting(String),
}

/// A problem found while loading persisted settings. Loading never fails;
/// the affected setting keeps its default.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingWarning {
    UnknownKey {
        key: String,
    },
    TypeMismatch {
        key: String,
        expected: String,
        found: String,
    },
    InvalidValue {
        key: String,
        reason: String,
    },
    NewerFormat {
        found: u32,
        supported: u32,
    },
}

impl fmt::Display for SettingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingWarning::UnknownKey { key } => write!(f, "unknown setting '{key}' ignored"),
            SettingWarning::TypeMismatch {
                key,
                expected,
                found,
            } => write!(
                f,
                "setting '{key}' expected {expected} but found {found}, using default"
            ),
            SettingWarning::InvalidValue { key, reason } => {
                write!(f, "setting '{key}' rejected ({reason}), using default")
            }
            SettingWarning::NewerFormat { found, supported } => write!(
                f,
                "settings written by format {found}, this build reads up to {supported}"
            ),
        }
    }
}

/// Persisted form of one module's settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsRecord {
    #[serde(default = "default_record_version")]
    pub version: u32,
    #[serde(default)]
    pub values: BTreeMap<String, toml::Value>,
}

fn default_record_version() -> u32 {
    SETTINGS_FORMAT_VERSION
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            values: BTreeMap::new(),
        }
    }
}

impl SettingsRecord {
    /// Decode a record from loosely typed TOML
    ///
    /// A `version` or `values` of the wrong type is reported and replaced by
    /// its default, which resets every setting when applied.
    pub fn decode(raw: &toml::Value) -> (Self, Vec<SettingWarning>) {
        let mut record = Self::default();
        let mut warnings = Vec::new();
        let Some(table) = raw.as_table() else {
            warnings.push(envelope_mismatch("settings", "table", raw));
            return (record, warnings);
        };

        if let Some(value) = table.get("version") {
            match value.as_integer().and_then(|v| u32::try_from(v).ok()) {
                Some(version) => record.version = version,
                None => warnings.push(envelope_mismatch("version", "integer", value)),
            }
        }
        match table.get("values") {
            None => {}
            Some(toml::Value::Table(values)) => {
                record.values = values
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
            }
            Some(value) => warnings.push(envelope_mismatch("values", "table", value)),
        }
        (record, warnings)
    }
}

fn envelope_mismatch(key: &str, expected: &str, found: &toml::Value) -> SettingWarning {
    SettingWarning::TypeMismatch {
        key: key.to_string(),
        expected: expected.to_string(),
        found: found.type_str().to_string(),
    }
}

struct Group {
    name: String,
    entries: Vec<Rc<dyn AnySetting>>,
}

/// Ordered, grouped collection of one module's settings
///
/// Clones share the same settings.
#[derive(Clone, Default)]
pub struct Settings {
    groups: Rc<RefCell<Vec<Group>>>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for setting in self.all() {
            map.entry(&setting.name().to_string(), &setting.value_string());
        }
        map.finish()
    }
}

/// Handle used to declare settings inside one named group
pub struct SettingGroup {
    settings: Settings,
    index: usize,
}

impl SettingGroup {
    pub fn name(&self) -> String {
        self.settings.groups.borrow()[self.index].name.clone()
    }

    pub fn add<K: SettingKind>(&self, builder: SettingBuilder<K>) -> Setting<K> {
        let setting = builder.build();
        self.settings.groups.borrow_mut()[self.index]
            .entries
            .push(Rc::new(setting.clone()));
        setting
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the group called `name`
    pub fn group(&self, name: &str) -> SettingGroup {
        let mut groups = self.groups.borrow_mut();
        let index = match groups.iter().position(|group| group.name == name) {
            Some(index) => index,
            None => {
                groups.push(Group {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                groups.len() - 1
            }
        };

        SettingGroup {
            settings: self.clone(),
            index,
        }
    }

    /// Settings in declaration order, grouped
    pub fn groups(&self) -> Vec<(String, Vec<Rc<dyn AnySetting>>)> {
        self.groups
            .borrow()
            .iter()
            .map(|group| (group.name.clone(), group.entries.clone()))
            .collect()
    }

    pub fn all(&self) -> Vec<Rc<dyn AnySetting>> {
        self.groups
            .borrow()
            .iter()
            .flat_map(|group| group.entries.iter().cloned())
            .collect()
    }

    /// Settings whose visibility predicate currently holds
    pub fn visible(&self) -> Vec<Rc<dyn AnySetting>> {
        self.all()
            .into_iter()
            .filter(|setting| setting.is_visible())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn AnySetting>> {
        self.all()
            .into_iter()
            .find(|setting| setting.name().eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.groups
            .borrow()
            .iter()
            .map(|group| group.entries.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names declared more than once
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for setting in self.all() {
            let name = setting.name().to_ascii_lowercase();
            if !seen.insert(name.clone()) && !duplicates.contains(&name) {
                duplicates.push(name);
            }
        }
        duplicates
    }

    pub fn set_from_str(&self, name: &str, text: &str) -> Result<(), SettingError> {
        self.get(name)
            .ok_or_else(|| SettingError::UnknownSetting(name.to_string()))?
            .set_from_str(text)
    }

    pub fn reset(&self, name: &str) -> Result<(), SettingError> {
        self.get(name)
            .ok_or_else(|| SettingError::UnknownSetting(name.to_string()))?
            .reset();
        Ok(())
    }

    pub fn reset_all(&self) {
        for setting in self.all() {
            setting.reset();
        }
    }

    pub fn serialize(&self) -> SettingsRecord {
        let values = self
            .all()
            .into_iter()
            .filter_map(|setting| Some((setting.name().to_string(), setting.to_toml()?)))
            .collect();

        SettingsRecord {
            version: SETTINGS_FORMAT_VERSION,
            values,
        }
    }

    /// Apply a persisted record
    ///
    /// Keys missing from the record reset to their defaults. Unknown keys,
    /// values of the wrong type and rejected values are reported and skipped.
    pub fn deserialize(&self, record: &SettingsRecord) -> Vec<SettingWarning> {
        let mut warnings = Vec::new();

        if record.version > SETTINGS_FORMAT_VERSION {
            warnings.push(SettingWarning::NewerFormat {
                found: record.version,
                supported: SETTINGS_FORMAT_VERSION,
            });
        }

        let settings = self.all();
        for setting in &settings {
            match record.values.get(setting.name()) {
                Some(raw) => {
                    if let Err(warning) = setting.load_toml(raw) {
                        warnings.push(warning);
                    }
                }
                None => setting.reset(),
            }
        }

        for key in record.values.keys() {
            if !settings.iter().any(|setting| setting.name() == key) {
                warnings.push(SettingWarning::UnknownKey { key: key.clone() });
            }
        }

        for warning in &warnings {
            warn!(target: "settings", "{}", warning);
        }
        warnings
    }
}
