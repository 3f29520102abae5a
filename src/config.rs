use crate::bulk::InsertOptions;
use crate::core::{AdminError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration structure parsed from a TOML file.
///
/// Every section is optional; missing values fall back to defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub import: ImportConfig,
    pub logging: LoggingConfig,
}

/// Session-related configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Database opened at start-up when none is given on the command line
    pub database: Option<PathBuf>,
    /// Reload the current table after every mutating statement
    pub refresh_after_mutation: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            database: None,
            refresh_after_mutation: true,
        }
    }
}

/// Import-related configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub trim_values: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            trim_values: InsertOptions::default().trim_values,
        }
    }
}

impl ImportConfig {
    pub fn insert_options(&self) -> InsertOptions {
        InsertOptions {
            trim_values: self.trim_values,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Maximum level: one of trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> Result<tracing::Level> {
        self.level
            .parse()
            .map_err(|_| AdminError::Config(format!("unknown log level '{}'", self.level)))
    }
}

/// Default location of the configuration file (`<config dir>/dbadmin/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dbadmin").join("config.toml"))
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = dbadmin::config::load_config("config.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).map_err(|e| AdminError::Config(e.to_string()))?;
    config.logging.max_level()?;
    Ok(config)
}
