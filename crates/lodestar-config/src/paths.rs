use std::path::PathBuf;

/// Platform-specific path handling that follows the XDG Base Directory layout on Unix-like systems
/// and Windows conventions on Windows.
///
/// On macOS and Linux:
/// - Config: $XDG_CONFIG_HOME/{name} (default: ~/.config/{name})
/// - Data: $XDG_DATA_HOME/{name} (default: ~/.local/share/{name})
///
/// On Windows:
/// - Config: %APPDATA%\{name}
/// - Data: %APPDATA%\{name}
pub struct ProjectPaths {
    name: String,
}

impl ProjectPaths {
    /// Create a new ProjectPaths instance for the given application name.
    pub fn new(name: &str) -> Option<Self> {
        get_home_dir()?;
        Some(ProjectPaths {
            name: name.to_string(),
        })
    }

    /// Paths for lodestar itself
    pub fn lodestar() -> Option<Self> {
        Self::new("lodestar")
    }

    pub fn config_dir(&self) -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            get_windows_appdata()
                .map(|p| p.join(&self.name))
                .unwrap_or_else(|| PathBuf::from(format!(".{}", self.name)))
        }

        #[cfg(not(target_os = "windows"))]
        {
            get_xdg_dir("XDG_CONFIG_HOME", &[".config"], &self.name)
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            get_windows_appdata()
                .map(|p| p.join(&self.name))
                .unwrap_or_else(|| PathBuf::from(format!(".{}", self.name)))
        }

        #[cfg(not(target_os = "windows"))]
        {
            get_xdg_dir("XDG_DATA_HOME", &[".local", "share"], &self.name)
        }
    }

    /// Default location of the module profile (active modules, keybinds, settings)
    pub fn profile_path(&self) -> PathBuf {
        self.config_dir().join("profiles").join("default.toml")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}

/// Get the home directory, respecting HOME and USERPROFILE environment variables.
fn get_home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}

/// Resolve an XDG directory: `$var` if set, else `~/<fallback...>`.
#[cfg(not(target_os = "windows"))]
fn get_xdg_dir(var: &str, fallback: &[&str], name: &str) -> PathBuf {
    std::env::var(var)
        .ok()
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            get_home_dir().map(|home| fallback.iter().fold(home, |path, part| path.join(part)))
        })
        .unwrap_or_else(|| fallback.iter().collect())
        .join(name)
}

#[cfg(target_os = "windows")]
fn get_windows_appdata() -> Option<PathBuf> {
    std::env::var("APPDATA").ok().map(PathBuf::from)
}
