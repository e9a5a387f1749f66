//! Configuration management for the aniview project.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory settings
    pub data: DataConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Upstream API settings
    pub api: ApiConfig,

    /// Query cache settings
    #[serde(default)]
    pub query: QueryConfig,
}

/// Data directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root data directory path
    pub root_dir: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log directory path (relative to data directory or absolute)
    pub log_dir: String,

    /// Default log level (trace, debug, info, warn, error)
    pub default_level: String,

    /// Enable console output
    pub console: bool,

    /// Enable file output
    pub file: bool,

    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

/// Upstream API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Jikan API base URL
    pub base_url: String,

    /// User agent sent with every request
    pub user_agent: String,

    /// Minimum spacing between dispatch starts, in milliseconds
    pub min_interval_ms: u64,

    /// Attempt budget for transport failures (total attempts)
    pub max_attempts: u32,

    /// Fallback delay when a 429 carries no Retry-After, in milliseconds
    pub retry_delay_ms: u64,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
}

/// Query cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Seconds after which a cached entry is considered stale.
    /// None means entries stay fresh for the lifetime of the process.
    pub stale_seconds: Option<u64>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_seconds: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                root_dir: "data".to_string(),
            },
            logging: LoggingConfig {
                log_dir: "logs".to_string(),
                default_level: "info".to_string(),
                console: true,
                file: true,
                json_format: false,
            },
            api: ApiConfig {
                base_url: "https://api.jikan.moe/v4".to_string(),
                user_agent: "aniview/0.1.0".to_string(),
                min_interval_ms: 1000,
                max_attempts: 3,
                retry_delay_ms: 1000,
                timeout_seconds: 30,
            },
            query: QueryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// If the file doesn't exist, returns the default configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load configuration from a TOML file or create default if not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::from_file(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration saved successfully"
        );

        Ok(())
    }

    /// Get the absolute path for the data directory
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.root_dir)
    }

    /// Get the absolute path for the log directory
    pub fn log_dir(&self) -> PathBuf {
        let log_path = Path::new(&self.logging.log_dir);
        if log_path.is_absolute() {
            log_path.to_path_buf()
        } else {
            self.data_dir().join(log_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data.root_dir, "data");
        assert_eq!(config.api.base_url, "https://api.jikan.moe/v4");
        assert_eq!(config.api.min_interval_ms, 1000);
        assert_eq!(config.api.max_attempts, 3);
        assert_eq!(config.query.stale_seconds, None);
    }

    #[test]
    fn test_save_and_load_config() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");

        let original_config = Config::default();
        original_config.save(&config_path)?;

        assert!(config_path.exists());

        let loaded_config = Config::from_file(&config_path)?;
        assert_eq!(loaded_config.data.root_dir, original_config.data.root_dir);
        assert_eq!(loaded_config.api.base_url, original_config.api.base_url);
        assert_eq!(
            loaded_config.api.retry_delay_ms,
            original_config.api.retry_delay_ms
        );

        Ok(())
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        // Should return default config without error
        assert_eq!(config.data.root_dir, "data");
    }

    #[test]
    fn test_query_section_optional() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");

        // A config file written before the [query] section existed
        let minimal = r#"
[data]
root_dir = "data"

[logging]
log_dir = "logs"
default_level = "debug"
console = true
file = false
json_format = false

[api]
base_url = "https://api.jikan.moe/v4"
user_agent = "aniview-test"
min_interval_ms = 250
max_attempts = 5
retry_delay_ms = 500
timeout_seconds = 10
"#;
        std::fs::write(&config_path, minimal)?;

        let config = Config::from_file(&config_path)?;
        assert_eq!(config.api.min_interval_ms, 250);
        assert_eq!(config.api.max_attempts, 5);
        assert_eq!(config.query.stale_seconds, None);

        Ok(())
    }

    #[test]
    fn test_path_resolution() {
        let config = Config::default();

        let log_dir = config.log_dir();
        assert!(log_dir.ends_with("data/logs"));
    }
}
