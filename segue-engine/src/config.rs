//! Configuration management
//!
//! Two-tier configuration:
//! 1. **TOML bootstrap**: database path, port, logging, stream-provider
//!    endpoints (static, read at startup only)
//! 2. **Database runtime**: everything the engine persists (volume,
//!    equalizer, crossfade duration, last track) lives in the settings
//!    table and changes while running
//!
//! Precedence: command-line arguments > environment variables > TOML >
//! database > built-in defaults.

use crate::error::{Error, Result};
use segue_common::model::Platform;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Bootstrap configuration loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Configured stream-provider endpoints (fallback resolution and
    /// continuity search)
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// One stream-provider endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub platform: Platform,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            port: default_port(),
            logging: LoggingConfig::default(),
            providers: Vec::new(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("segue.db")
}

fn default_port() -> u16 {
    5870
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load the TOML config; a missing file yields built-in defaults.
pub fn load_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        info!("config file {} not found, using defaults", path.display());
        return Ok(TomlConfig::default());
    }
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}
