use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Namespace a module lives in
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Combat,
    Player,
    Movement,
    Render,
    World,
    Misc,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Combat,
        Category::Player,
        Category::Movement,
        Category::Render,
        Category::World,
        Category::Misc,
    ];

    /// Parse a category name, ignoring case
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_ref().eq_ignore_ascii_case(name))
    }
}

/// Stable identity of a module: `(category, name)`
///
/// Identifiers can be built in `const` context so that dependency and
/// conflict declarations are checked by the compiler rather than looked up
/// by string at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId {
    category: Category,
    name: Cow<'static, str>,
}

impl ModuleId {
    pub const fn from_static(category: Category, name: &'static str) -> Self {
        Self {
            category,
            name: Cow::Borrowed(name),
        }
    }

    pub fn new(category: Category, name: impl Into<String>) -> Self {
        Self {
            category,
            name: Cow::Owned(name.into()),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `category/name` form used in profiles and on the command line
    pub fn key(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }

    /// Parse the `category/name` form produced by [`ModuleId::key`]
    pub fn parse_key(key: &str) -> Option<Self> {
        let (category, name) = key.split_once('/')?;
        let category = Category::parse(category)?;
        if name.is_empty() {
            return None;
        }
        Some(Self::new(category, name))
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}
