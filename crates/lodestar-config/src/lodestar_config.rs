use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::paths::ProjectPaths;

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("IO error reading config: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigSaveError {
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("IO error writing config: {0}")]
    Io(#[from] std::io::Error),
}

/// Command input settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Prefix that turns an outgoing chat line into a command (default: ".")
    pub prefix: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            prefix: ".".to_string(),
        }
    }
}

/// Module registry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    /// Profile file holding active modules, keybinds and settings
    /// (default: ~/.config/lodestar/profiles/default.toml)
    pub profile: Option<PathBuf>,

    /// Save the profile on shutdown
    pub autosave: bool,

    /// Consecutive handler faults before a subscription is dropped
    pub fault_threshold: u32,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            profile: None,
            autosave: true,
            fault_threshold: 3,
        }
    }
}

impl ModulesConfig {
    /// Get the profile path (use provided or default)
    pub fn profile_path(&self) -> PathBuf {
        self.profile.clone().unwrap_or_else(|| {
            ProjectPaths::lodestar()
                .map(|p| p.profile_path())
                .unwrap_or_else(|| PathBuf::from("lodestar-profile.toml"))
        })
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write logs to a file in the data directory
    pub file: bool,
    /// Filter used when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: false,
            level: "info".to_string(),
        }
    }
}

/// Settings of the simulated host loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Host ticks per second
    pub tick_rate: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self { tick_rate: 20 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LodestarConfig {
    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub modules: ModulesConfig,

    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LodestarConfig {
    pub fn config_path() -> PathBuf {
        ProjectPaths::lodestar()
            .map(|p| p.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("lodestar.toml"))
    }

    /// Load from the default location
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigLoadError> {
        match Self::load_from(path) {
            Err(ConfigLoadError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self) -> Result<(), ConfigSaveError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigSaveError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self)?;
        fs::write(path, content)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: LodestarConfig = toml::from_str(
            r##"
[commands]
prefix = "#"

[modules]
fault_threshold = 5
"##,
        )
        .unwrap();

        assert_eq!(config.commands.prefix, "#");
        assert_eq!(config.modules.fault_threshold, 5);
        assert!(config.modules.autosave);
        assert_eq!(config.host.tick_rate, 20);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_unknown_sections_are_ignored() {
        let config: LodestarConfig = toml::from_str("[future]\nflag = true\n").unwrap();
        assert_eq!(config, LodestarConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = LodestarConfig::default();
        config.modules.profile = Some(dir.path().join("profile.toml"));
        config.host.tick_rate = 40;
        config.save_to(&path).unwrap();

        let loaded = LodestarConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        assert!(matches!(
            LodestarConfig::load_from(&path),
            Err(ConfigLoadError::NotFound(_))
        ));
        assert_eq!(
            LodestarConfig::load_or_default(&path).unwrap(),
            LodestarConfig::default()
        );
    }
}
