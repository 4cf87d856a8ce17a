use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::Level;

use crate::link::LinkSettings;

/// Application configuration, read from `teleop.toml`
///
/// Every field has a default, so an empty or partial file is valid.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct TeleopConfig {
    pub link: LinkSettings,
    pub logging: LoggingSettings,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Maximum log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingSettings {
    pub fn max_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(&self.level).map_err(|_| ConfigError::InvalidValue {
            field: "logging.level",
            reason: format!("unknown level \"{}\"", self.level),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path:?}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl TeleopConfig {
    /// `~/.config/maccepa-teleop/teleop.toml` on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("maccepa-teleop")
            .join("teleop.toml")
    }

    /// Load the config file
    ///
    /// A missing file falls back to defaults unless `required` is set,
    /// which is the case when the path was given on the command line.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: TeleopConfig =
            toml::from_str(&content).map_err(|source| ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.link.baud_rate == 0 {
            return Err(ConfigError::InvalidValue {
                field: "link.baud_rate",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.link.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "link.timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        self.logging.max_level()?;
        Ok(())
    }
}
