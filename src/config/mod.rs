//! Configuration management for tabexport
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConfigError, Result};
use crate::export::TextEncoding;

/// Prefix of environment variables overriding configuration values
pub const ENV_PREFIX: &str = "TABEXPORT_";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Export defaults
    #[serde(default)]
    pub export: ExportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Defaults applied to export requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Field delimiter of delimited text files
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Always quote text fields
    #[serde(default = "default_quote_string_fields")]
    pub quote_string_fields: bool,

    /// Encoding of delimited text files (utf8, utf16)
    #[serde(default)]
    pub encoding: TextEncoding,

    /// Show a progress spinner while exporting
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_delimiter() -> String {
    ",".to_string()
}

fn default_quote_string_fields() -> bool {
    true
}

fn default_show_progress() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    false
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            quote_string_fields: default_quote_string_fields(),
            encoding: TextEncoding::default(),
            show_progress: default_show_progress(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string()).into()
            } else {
                crate::error::ExportError::from(e)
            }
        })?;
        Self::from_toml(&content)
    }

    /// Load configuration from all sources with proper precedence
    ///
    /// An explicit `path` must exist; the default file is optional.
    ///
    /// # Returns
    /// * `Result<Config>` - Merged and validated configuration or error
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TABEXPORT_*` overrides
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of an environment variable
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = parse_value("logging.level", &level)?;
        }
        if let Some(delimiter) = var("DELIMITER") {
            self.export.delimiter = delimiter;
        }
        if let Some(encoding) = var("ENCODING") {
            self.export.encoding = TextEncoding::from_str(&encoding).map_err(|_| {
                ConfigError::InvalidValue {
                    field: "export.encoding".to_string(),
                    value: encoding.clone(),
                }
            })?;
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tabexport")
            .join("config.toml")
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        let delimiter = &self.export.delimiter;
        if delimiter.is_empty() || delimiter.contains(['"', '\r', '\n']) {
            return Err(ConfigError::InvalidValue {
                field: "export.delimiter".to_string(),
                value: delimiter.clone(),
            }
            .into());
        }
        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

fn parse_value<T: FromStr>(field: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.export.delimiter, ",");
        assert!(config.export.quote_string_fields);
        assert_eq!(config.export.encoding, TextEncoding::Utf8);
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [export]
            delimiter = ";"
            encoding = "utf16"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.export.delimiter, ";");
        assert_eq!(config.export.encoding, TextEncoding::Utf16);
        assert!(config.export.quote_string_fields);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(!config.logging.timestamps);
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("[export\n").unwrap_err();
        assert!(matches!(err, ExportError::Config(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_from_file_round_trips_to_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.export.delimiter = "\t".to_string();
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ExportError::Config(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TABEXPORT_LOG_LEVEL", "trace"),
            ("TABEXPORT_DELIMITER", "|"),
            ("TABEXPORT_ENCODING", "utf-16"),
        ]);
        let mut config = Config::default();
        config
            .apply_env_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Trace);
        assert_eq!(config.export.delimiter, "|");
        assert_eq!(config.export.encoding, TextEncoding::Utf16);
    }

    #[test]
    fn test_env_override_rejects_bad_level() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(|name| (name == "TABEXPORT_LOG_LEVEL").then(|| "loud".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_validate_rejects_bad_delimiter() {
        let mut config = Config::default();
        config.export.delimiter = String::new();
        assert!(config.validate().is_err());
        config.export.delimiter = "\"".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
    }
}
