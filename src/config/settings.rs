//! Application settings.
//!
//! Connection strings come from the environment (`DATABASE_URL`,
//! `REMOTE_DATABASE_URL`); behaviour settings come from a TOML file at
//! `TESOURARIA_CONFIG` (default `./config.toml`). A missing file means
//! defaults: 500 ms write debounce and the two-step approval chain.

use super::database::get_database_url;
use crate::errors::{Error, Result};
use crate::models::WorkflowConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Contents of config.toml.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub storage: StorageSettings,
    /// Seed for the persisted `workflowConfig` key.
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Coalescing window for scheduled writes, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

const fn default_debounce_ms() -> u64 {
    500
}

impl StorageSettings {
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Parses settings from a TOML file.
///
/// # Errors
/// Returns `Error::Config` if the file cannot be read or parsed.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    debug!("Loading settings from {:?}", path);
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path.display()),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path.display()),
    })
}

/// Everything needed to build the service graph.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub remote_database_url: Option<String>,
    pub settings: Settings,
}

impl AppConfig {
    /// Reads the environment and, if present, the config file.
    ///
    /// # Errors
    /// Returns `Error::Config` if a config file exists but is invalid.
    pub fn from_env() -> Result<Self> {
        let config_path =
            std::env::var("TESOURARIA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let settings = if Path::new(&config_path).exists() {
            load_settings(&config_path)?
        } else {
            info!("No config file at {}, using defaults", config_path);
            Settings::default()
        };

        let remote_database_url = std::env::var("REMOTE_DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Ok(Self {
            database_url: get_database_url(),
            remote_database_url,
            settings,
        })
    }
}
