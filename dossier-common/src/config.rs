//! Configuration file resolution and TOML loading
//!
//! Config file resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`DOSSIER_CONFIG`)
//! 3. User config directory (`~/.config/dossier/config.toml` on Linux)
//! 4. System config (`/etc/dossier/config.toml`, Linux only)
//!
//! A missing config file is never fatal: callers get compiled defaults and a
//! warning in the log.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "DOSSIER_CONFIG";

/// Config file name inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
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

/// Where a resolved config path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine,
    Environment,
    UserConfigDir,
    SystemConfig,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CommandLine => write!(f, "command line"),
            ConfigSource::Environment => write!(f, "environment"),
            ConfigSource::UserConfigDir => write!(f, "user config directory"),
            ConfigSource::SystemConfig => write!(f, "system config"),
        }
    }
}

/// Resolves which config file (if any) a process should load
#[derive(Debug, Clone)]
pub struct ConfigFileResolver {
    app_name: String,
    cli_arg: Option<PathBuf>,
}

impl ConfigFileResolver {
    /// Create a resolver for the given application directory name
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            cli_arg: None,
        }
    }

    /// Supply the `--config` command-line argument (highest priority)
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Resolve the config path following the priority order
    ///
    /// Command-line and environment paths are returned even when the file
    /// does not exist, so that the loader can warn about the explicit miss.
    /// Platform locations are only returned when the file exists.
    pub fn resolve(&self) -> Option<(PathBuf, ConfigSource)> {
        if let Some(path) = &self.cli_arg {
            return Some((path.clone(), ConfigSource::CommandLine));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some((PathBuf::from(path), ConfigSource::Environment));
            }
        }

        if let Some(path) = self.user_config_path() {
            if path.exists() {
                return Some((path, ConfigSource::UserConfigDir));
            }
        }

        if cfg!(target_os = "linux") {
            let system = PathBuf::from("/etc").join(&self.app_name).join(CONFIG_FILE_NAME);
            if system.exists() {
                return Some((system, ConfigSource::SystemConfig));
            }
        }

        None
    }

    /// Platform user config path (`dirs::config_dir()/<app>/config.toml`)
    pub fn user_config_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(&self.app_name).join(CONFIG_FILE_NAME))
    }
}

/// Load a TOML config file, falling back to defaults when it is missing
///
/// Parse errors are reported as `Error::Config`; a missing file only logs a
/// warning.
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No config file found, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} not found, using compiled defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Write a config as TOML, atomically replacing any existing file
pub fn write_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
