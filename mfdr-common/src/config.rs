//! Configuration loading and state folder resolution
//!
//! Bootstrap settings come from a TOML file. Missing or unreadable files are
//! never fatal: a warning is logged and compiled defaults are used.
//!
//! State folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`MFDR_STATE_DIR`)
//! 3. TOML config file (`state_folder`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the state folder
pub const STATE_DIR_ENV: &str = "MFDR_STATE_DIR";

/// Environment variable overriding the log level
pub const LOG_LEVEL_ENV: &str = "MFDR_LOG_LEVEL";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Folder holding checkpoints and other scan state
    #[serde(default)]
    pub state_folder: Option<PathBuf>,

    /// Root folder for quarantined files (per-category buckets live below it)
    #[serde(default)]
    pub quarantine_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    /// Effective level after applying the `MFDR_LOG_LEVEL` override
    pub fn effective_level(&self) -> String {
        match std::env::var(LOG_LEVEL_ENV) {
            Ok(level) if !level.trim().is_empty() => level.trim().to_lowercase(),
            _ => self.level.clone(),
        }
    }
}

/// Resolve the state folder following the documented priority order
pub fn resolve_state_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(STATE_DIR_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &toml_config.state_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_state_folder()
}

/// OS-dependent default state folder
pub fn default_state_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mfdr"))
        .unwrap_or_else(|| PathBuf::from("./mfdr_state"))
}

/// Locate the user or system configuration file, if one exists
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("mfdr").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/mfdr/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Parse a TOML file into any deserializable config type
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load a TOML config, falling back to defaults when the file is missing or invalid
pub fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> T {
    let Some(path) = path else {
        debug!("No config file found, using compiled defaults");
        return T::default();
    };

    if !path.exists() {
        warn!("Config file {} not found, using compiled defaults", path.display());
        return T::default();
    }

    match load_toml(path) {
        Ok(config) => {
            debug!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{}; using compiled defaults", e);
            T::default()
        }
    }
}

/// Write a TOML config atomically (temp file + rename)
pub fn write_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}
