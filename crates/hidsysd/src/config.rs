//! TOML configuration for the daemon.
//!
//! Every field has a default so the daemon runs correctly with no config
//! file at all; a partial file overrides only what it names.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
}

/// General daemon behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Settings for the watched system input service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Registry name of the shared input service class.
    #[serde(default = "default_service_class")]
    pub class: String,
}

/// Settings for the extension load loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoaderConfig {
    /// Directory holding the extension payload.
    #[serde(default = "default_extension_dir")]
    pub extension_dir: PathBuf,
    /// File name of the extension payload inside `extension_dir`.
    #[serde(default = "default_extension_name")]
    pub extension_name: String,
    /// Milliseconds between load attempts.
    #[serde(default = "default_retry_period_ms")]
    pub retry_period_ms: u64,
    /// Path of the JSON state file other processes observe.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

impl LoaderConfig {
    /// Full path to the extension payload.
    pub fn extension_path(&self) -> PathBuf {
        self.extension_dir.join(&self.extension_name)
    }

    pub fn retry_period(&self) -> Duration {
        Duration::from_millis(self.retry_period_ms)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_service_class() -> String {
    "IOHIDSystem".to_string()
}
fn default_extension_dir() -> PathBuf {
    PathBuf::from("/Library/Application Support/hidsysd/Extensions")
}
fn default_extension_name() -> String {
    "VirtualHIDKeyboard.kext".to_string()
}
fn default_retry_period_ms() -> u64 {
    crate::application::extension_loader::DEFAULT_RETRY_PERIOD.as_millis() as u64
}
fn default_state_file() -> PathBuf {
    PathBuf::from("/var/lib/hidsysd/loader_state.json")
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            class: default_service_class(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extension_dir: default_extension_dir(),
            extension_name: default_extension_name(),
            retry_period_ms: default_retry_period_ms(),
            state_file: default_state_file(),
        }
    }
}

/// Loads the config from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not
/// found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
