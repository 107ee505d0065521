pub mod lodestar_config;
pub mod paths;

pub use lodestar_config::{
    CommandsConfig, ConfigLoadError, ConfigSaveError, HostConfig, LodestarConfig, LoggingConfig,
    ModulesConfig,
};
pub use paths::ProjectPaths;
