//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk, applying
//! environment overrides, and validating the result.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path specified via the `CONFIG_FILE` CLI argument
//! 2. Default location:
//!    - **Linux/macOS:** `~/.instagram-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.instagram-mcp\config.json`
//!
//! A missing file at the default location is not an error: defaults plus
//! environment variables are used instead, so the server can run from
//! `INSTAGRAM_ACCESS_TOKEN` alone.
//!
//! # Example Configuration
//!
//! See `config/example-config.json` for a complete example.

mod settings;

pub use settings::{
    CacheConfig, Config, HttpConfig, InstagramConfig, LogFormat, LoggingConfig, PublishingConfig,
    RateLimitConfig, ENV_ACCESS_TOKEN, ENV_API_VERSION, ENV_APP_ID, ENV_APP_SECRET,
    ENV_BUSINESS_ACCOUNT_ID,
};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.instagram-mcp/`
/// - **Windows:** `%USERPROFILE%\.instagram-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".instagram-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads the configuration and applies overrides from the process environment.
///
/// If `path` is `None`, uses the platform-specific default location.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - Fields are invalid after overrides are applied
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

/// Like [`load_config`], with an explicit environment lookup.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(p) => read_config(p)?,
        None => match default_config_path() {
            Some(p) if p.exists() => read_config(&p)?,
            _ => Config::default(),
        },
    };

    config.apply_env_overrides(lookup);

    // Validate the configuration
    config.validate()?;

    Ok(config)
}

fn read_config(config_path: &Path) -> Result<Config, ConfigError> {
    if !config_path.exists() {
        return Err(ConfigError::NotFound {
            path: config_path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(config_path).map_err(|e| ConfigError::Read {
        path: config_path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: config_path.to_path_buf(),
        source: e,
    })
}
