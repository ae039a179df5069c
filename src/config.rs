//! Tub configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to its
//! default.
//!
//! ```json
//! {
//!   "max_catalog_len": 1000,
//!   "asset_dir": "images",
//!   "log_level": "info"
//! }
//! ```

use std::fs;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::{log_event_with_fields, Event, Logger, Severity};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Tub configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TubConfig {
    /// Index slots per catalog segment (default: 1000).
    /// Only consulted when a tub is created; opened tubs keep their own.
    #[serde(default = "default_max_catalog_len")]
    pub max_catalog_len: u64,

    /// Directory under the tub root holding asset payloads (default: "images")
    #[serde(default = "default_asset_dir")]
    pub asset_dir: String,

    /// Minimum log severity (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_catalog_len() -> u64 {
    1000
}

fn default_asset_dir() -> String {
    "images".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TubConfig {
    fn default() -> Self {
        Self {
            max_catalog_len: default_max_catalog_len(),
            asset_dir: default_asset_dir(),
            log_level: default_log_level(),
        }
    }
}

impl TubConfig {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;

        let config = Self::from_json(&content)?;

        log_event_with_fields(Event::ConfigLoaded, &[("path", path.display().to_string().as_str())]);

        Ok(config)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: TubConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Config with a custom segment size
    pub fn with_max_catalog_len(max_catalog_len: u64) -> Self {
        Self {
            max_catalog_len,
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_catalog_len == 0 {
            return Err(ConfigError::Invalid("max_catalog_len must be > 0".into()));
        }

        let asset_dir = Path::new(&self.asset_dir);
        if self.asset_dir.is_empty()
            || !asset_dir
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(ConfigError::Invalid(format!(
                "asset_dir must be a relative path without '..': '{}'",
                self.asset_dir
            )));
        }

        self.log_severity()?;
        Ok(())
    }

    /// Parsed `log_level`
    pub fn log_severity(&self) -> Result<Severity, ConfigError> {
        self.log_level.parse::<Severity>().map_err(ConfigError::Invalid)
    }

    /// Applies `log_level` to the process-wide logger
    pub fn apply_logging(&self) -> Result<(), ConfigError> {
        Logger::set_min_severity(self.log_severity()?);
        Ok(())
    }
}
