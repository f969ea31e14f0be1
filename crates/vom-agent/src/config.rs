//! Agent configuration.
//!
//! Loaded from a JSON file; every field has a default so a partial (or
//! empty) file is valid. Command-line flags override the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use vom_hw::TableId;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration for {field}: {message}")]
    Invalid { field: String, message: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Complete agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Client key the agent's objects are recorded under
    #[serde(default = "default_client")]
    pub client: String,

    /// Liveness poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Routing tables to program. The default table is always added.
    #[serde(default)]
    pub route_domains: Vec<TableId>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_client() -> String {
    "vom-agent".to_string()
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            client: default_client(),
            poll_interval_ms: default_poll_interval(),
            route_domains: Vec::new(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl AgentConfig {
    /// Loads and validates a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks field values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.is_empty() {
            return Err(ConfigError::Invalid {
                field: "client".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms".to_string(),
                message: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
