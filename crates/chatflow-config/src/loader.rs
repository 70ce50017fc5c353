//! Config file loading.
//!
//! A single json5 file; missing fields fall back to schema defaults so a
//! deployment only states what it overrides.

use crate::{ChatflowConfig, ConfigError};
use directories::ProjectDirs;
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Default config filename.
const DEFAULT_CONFIG_FILE: &str = "chatflow.json5";

/// Default per-user config path, when the platform exposes one.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "chatflow")
        .map(|dirs| dirs.config_dir().join(DEFAULT_CONFIG_FILE))
}

/// Load and validate config from an explicit path.
pub fn load_config(path: &Path) -> Result<ChatflowConfig, ConfigError> {
    debug!("loading config (path={})", path.display());
    let contents = std::fs::read_to_string(path)?;
    let config: ChatflowConfig = json5::from_str(&contents)?;
    config.validate()?;
    info!("loaded config (path={})", path.display());
    Ok(config)
}

/// Load config from the default location, falling back to defaults when the
/// file does not exist.
pub fn load_config_or_default() -> Result<ChatflowConfig, ConfigError> {
    match default_config_path() {
        Some(path) if path.exists() => load_config(&path),
        _ => {
            debug!("no config file found, using defaults");
            Ok(ChatflowConfig::default())
        }
    }
}
