use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use super::{SettingError, SettingWarning};

/// The type and domain of a setting
///
/// Implementations decide what a valid value is. Bounded numeric kinds clamp
/// out-of-range values; every other kind rejects them.
pub trait SettingKind: 'static {
    type Value: Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + 'static;

    /// Short description of the domain, e.g. `integer in [0, 36]`
    fn describe(&self) -> String;

    /// Check a candidate value, returning the value to store
    fn validate(&self, value: Self::Value) -> Result<Self::Value, String>;

    /// Parse text typed by the user (commands, config UIs)
    fn parse(&self, text: &str) -> Result<Self::Value, String>;

    /// Render a value for display
    fn display(&self, value: &Self::Value) -> String;

    /// Value used when a declared default is outside the domain
    fn fallback(&self) -> Self::Value;
}

struct SettingInner<K: SettingKind> {
    name: String,
    description: String,
    kind: K,
    default: K::Value,
    value: RefCell<K::Value>,
    visible: Option<Box<dyn Fn() -> bool>>,
    listeners: RefCell<Vec<Rc<dyn Fn(&K::Value)>>>,
}

/// A typed, validated configuration value owned by one module
///
/// Cloning yields another handle to the same value, so a module can keep a
/// `Setting` in a field while its settings collection serializes it.
pub struct Setting<K: SettingKind> {
    inner: Rc<SettingInner<K>>,
}

impl<K: SettingKind> Clone for Setting<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K: SettingKind> fmt::Debug for Setting<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setting")
            .field("name", &self.inner.name)
            .field("value", &*self.inner.value.borrow())
            .field("default", &self.inner.default)
            .finish()
    }
}

impl<K: SettingKind> Setting<K> {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    pub fn kind(&self) -> &K {
        &self.inner.kind
    }

    pub fn get(&self) -> K::Value {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&K::Value) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    pub fn default_value(&self) -> &K::Value {
        &self.inner.default
    }

    /// Validate and store a value. Invalid values leave the current one untouched.
    pub fn set(&self, value: K::Value) -> Result<(), SettingError> {
        let validated = self
            .inner
            .kind
            .validate(value)
            .map_err(|reason| SettingError::InvalidValue {
                setting: self.inner.name.clone(),
                reason,
            })?;
        self.store(validated);
        Ok(())
    }

    /// Parse and store a value typed as text
    pub fn set_from_str(&self, text: &str) -> Result<(), SettingError> {
        let parsed = self
            .inner
            .kind
            .parse(text)
            .map_err(|reason| SettingError::InvalidValue {
                setting: self.inner.name.clone(),
                reason,
            })?;
        self.set(parsed)
    }

    pub fn reset(&self) {
        self.store(self.inner.default.clone());
    }

    pub fn is_default(&self) -> bool {
        *self.inner.value.borrow() == self.inner.default
    }

    /// Whether a settings UI should show this setting right now
    pub fn is_visible(&self) -> bool {
        self.inner.visible.as_ref().is_none_or(|visible| visible())
    }

    /// Run `listener` after every change of the stored value
    pub fn on_changed(&self, listener: impl Fn(&K::Value) + 'static) {
        self.inner.listeners.borrow_mut().push(Rc::new(listener));
    }

    fn store(&self, value: K::Value) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        debug!(target: "settings", "{} = {}", self.inner.name, self.value_string());

        let value = self.get();
        let listeners: Vec<_> = self.inner.listeners.borrow().clone();
        for listener in listeners {
            listener(&value);
        }
    }

    fn value_string(&self) -> String {
        self.inner.kind.display(&self.inner.value.borrow())
    }
}

/// Type-erased view of a setting used by serialization and text surfaces
pub trait AnySetting {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// Domain description, e.g. `one of: words, repeats, both`
    fn describe(&self) -> String;
    fn is_visible(&self) -> bool;
    fn is_default(&self) -> bool;
    fn value_string(&self) -> String;
    fn default_string(&self) -> String;
    fn set_from_str(&self, text: &str) -> Result<(), SettingError>;
    fn reset(&self);
    fn to_toml(&self) -> Option<toml::Value>;
    /// Load a persisted value; on failure the setting is left at its default
    fn load_toml(&self, raw: &toml::Value) -> Result<(), SettingWarning>;
}

impl<K: SettingKind> AnySetting for Setting<K> {
    fn name(&self) -> &str {
        Setting::name(self)
    }

    fn description(&self) -> &str {
        Setting::description(self)
    }

    fn describe(&self) -> String {
        self.inner.kind.describe()
    }

    fn is_visible(&self) -> bool {
        Setting::is_visible(self)
    }

    fn is_default(&self) -> bool {
        Setting::is_default(self)
    }

    fn value_string(&self) -> String {
        Setting::value_string(self)
    }

    fn default_string(&self) -> String {
        self.inner.kind.display(&self.inner.default)
    }

    fn set_from_str(&self, text: &str) -> Result<(), SettingError> {
        Setting::set_from_str(self, text)
    }

    fn reset(&self) {
        Setting::reset(self)
    }

    fn to_toml(&self) -> Option<toml::Value> {
        match toml::Value::try_from(&*self.inner.value.borrow()) {
            Ok(value) => Some(value),
            Err(e) => {
                error!(target: "settings", "Cannot serialize setting '{}': {}", self.inner.name, e);
                None
            }
        }
    }

    fn load_toml(&self, raw: &toml::Value) -> Result<(), SettingWarning> {
        let value: K::Value = match raw.clone().try_into() {
            Ok(value) => value,
            Err(_) => {
                self.reset();
                return Err(SettingWarning::TypeMismatch {
                    key: self.inner.name.clone(),
                    expected: self.inner.kind.describe(),
                    found: raw.type_str().to_string(),
                });
            }
        };

        self.set(value).map_err(|e| {
            self.reset();
            SettingWarning::InvalidValue {
                key: self.inner.name.clone(),
                reason: e.to_string(),
            }
        })
    }
}

/// Declaration of a setting, turned into a [`Setting`] by
/// [`SettingGroup::add`](super::SettingGroup::add)
pub struct SettingBuilder<K: SettingKind> {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) kind: K,
    pub(crate) default: K::Value,
    visible: Option<Box<dyn Fn() -> bool>>,
    listeners: Vec<Rc<dyn Fn(&K::Value)>>,
}

impl<K: SettingKind> SettingBuilder<K> {
    pub fn new(name: impl Into<String>, kind: K, default: K::Value) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            default,
            visible: None,
            listeners: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn default_value(mut self, default: K::Value) -> Self {
        self.default = default;
        self
    }

    /// Only show this setting while `visible` returns true
    ///
    /// The predicate usually captures sibling settings:
    /// `.visible({ let mode = mode.clone(); move || mode.get() != "words" })`
    pub fn visible(mut self, visible: impl Fn() -> bool + 'static) -> Self {
        self.visible = Some(Box::new(visible));
        self
    }

    pub fn on_changed(mut self, listener: impl Fn(&K::Value) + 'static) -> Self {
        self.listeners.push(Rc::new(listener));
        self
    }

    pub(crate) fn build(self) -> Setting<K> {
        let default = match self.kind.validate(self.default.clone()) {
            Ok(default) => default,
            Err(reason) => {
                let fallback = self.kind.fallback();
                error!(
                    target: "settings",
                    "Default for '{}' is invalid ({}), using {:?}",
                    self.name,
                    reason,
                    fallback
                );
                fallback
            }
        };

        Setting {
            inner: Rc::new(SettingInner {
                name: self.name,
                description: self.description,
                kind: self.kind,
                value: RefCell::new(default.clone()),
                default,
                visible: self.visible,
                listeners: RefCell::new(self.listeners),
            }),
        }
    }
}
