//! Error types for configuration loading.
//!
//! Messages never include the access token or app secret. Validation
//! failures name the offending setting, not its value.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ENV_ACCESS_TOKEN;

/// Why a configuration could not be loaded or turned into client settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No file at the given path.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Where the file was expected.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("failed to read configuration file: {path}")]
    Read {
        /// Path to the configuration file.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid configuration JSON.
    #[error("failed to parse configuration file: {path}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Neither the file nor the environment supplied an access token.
    #[error("no access token configured; set instagram.access_token or {}", ENV_ACCESS_TOKEN)]
    MissingAccessToken,

    /// A secret setting is present but blank.
    #[error("{setting} must not be empty")]
    EmptySecret {
        /// Dotted path of the setting.
        setting: &'static str,
    },

    /// An app secret without the app it belongs to.
    #[error("instagram.app_secret requires instagram.app_id")]
    AppSecretWithoutAppId,

    /// A Graph API version that is not of the form `v19.0`.
    #[error("{setting} '{value}' must look like 'v19.0'")]
    ApiVersion {
        /// Dotted path of the setting.
        setting: &'static str,
        /// The rejected version string.
        value: String,
    },

    /// Any other out-of-range setting.
    #[error("{setting}: {reason}")]
    Invalid {
        /// Dotted path of the setting.
        setting: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(setting: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            setting,
            reason: reason.into(),
        }
    }
}
