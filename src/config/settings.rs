//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Secrets may also come from the environment; see
//! [`Config::apply_env_overrides`].

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;
use crate::graph::config::{
    DEFAULT_API_BASE_URL, DEFAULT_API_VERSION, DEFAULT_MESSAGING_API_VERSION,
};
use crate::graph::{
    BackoffPolicy, CachePolicy, ClientConfig, Credentials, PublishingRules, RateLimits,
};
use crate::graph::transport::HttpSettings;

/// Environment variable holding the access token.
pub const ENV_ACCESS_TOKEN: &str = "INSTAGRAM_ACCESS_TOKEN";
/// Environment variable holding the business account id.
pub const ENV_BUSINESS_ACCOUNT_ID: &str = "INSTAGRAM_BUSINESS_ACCOUNT_ID";
/// Environment variable holding the Facebook app id.
pub const ENV_APP_ID: &str = "FACEBOOK_APP_ID";
/// Environment variable holding the Facebook app secret.
pub const ENV_APP_SECRET: &str = "FACEBOOK_APP_SECRET";
/// Environment variable overriding the Graph API version.
pub const ENV_API_VERSION: &str = "INSTAGRAM_API_VERSION";

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Account credentials and API location.
    #[serde(default)]
    pub instagram: InstagramConfig,

    /// Quota ceilings and backoff.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Response cache.
    #[serde(default)]
    pub cache: CacheConfig,

    /// HTTP connection settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Local publishing checks.
    #[serde(default)]
    pub publishing: PublishingConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Overrides credentials with values from the environment.
    ///
    /// `lookup` returns the value of a variable; empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let ig = &mut self.instagram;

        if let Some(token) = get(ENV_ACCESS_TOKEN) {
            ig.access_token = Some(SecretString::from(token));
        }
        if let Some(id) = get(ENV_BUSINESS_ACCOUNT_ID) {
            ig.business_account_id = Some(id);
        }
        if let Some(id) = get(ENV_APP_ID) {
            ig.app_id = Some(id);
        }
        if let Some(secret) = get(ENV_APP_SECRET) {
            ig.app_secret = Some(SecretString::from(secret));
        }
        if let Some(version) = get(ENV_API_VERSION) {
            ig.api_version = version;
        }
    }

    /// Validates the configuration.
    ///
    /// A missing access token is not an error here; it is reported by
    /// [`Config::client_config`].
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ig = &self.instagram;

        for (setting, secret) in [
            ("instagram.access_token", &ig.access_token),
            ("instagram.app_secret", &ig.app_secret),
        ] {
            if secret
                .as_ref()
                .is_some_and(|s| s.expose_secret().trim().is_empty())
            {
                return Err(ConfigError::EmptySecret { setting });
            }
        }

        match Url::parse(&ig.api_base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::invalid(
                    "instagram.api_base_url",
                    format!("'{}' is not an http(s) URL", ig.api_base_url),
                ))
            }
        }

        for (setting, version) in [
            ("instagram.api_version", &ig.api_version),
            ("instagram.messaging_api_version", &ig.messaging_api_version),
        ] {
            if !is_api_version(version) {
                return Err(ConfigError::ApiVersion {
                    setting,
                    value: version.clone(),
                });
            }
        }

        if ig.app_secret.is_some() && ig.app_id.is_none() {
            return Err(ConfigError::AppSecretWithoutAppId);
        }

        let limits = &self.rate_limit;
        if limits.requests_per_hour == 0 || limits.posts_per_day == 0 {
            return Err(ConfigError::invalid(
                "rate_limit",
                "ceilings must be greater than zero",
            ));
        }
        if limits.base_delay_ms > limits.max_delay_ms {
            return Err(ConfigError::invalid(
                "rate_limit.base_delay_ms",
                format!("{} exceeds max_delay_ms ({})", limits.base_delay_ms, limits.max_delay_ms),
            ));
        }

        if self.cache.enabled && (self.cache.ttl_seconds == 0 || self.cache.max_entries == 0) {
            return Err(ConfigError::invalid(
                "cache",
                "ttl_seconds and max_entries must be greater than zero",
            ));
        }

        if self.http.timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "http.timeout_seconds",
                "must be greater than zero",
            ));
        }

        if self
            .logging
            .file
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            return Err(ConfigError::invalid("logging.file", "must not be empty"));
        }

        let publishing = &self.publishing;
        if publishing.allowed_image_formats.is_empty() || publishing.allowed_video_formats.is_empty() {
            return Err(ConfigError::invalid(
                "publishing",
                "format lists must not be empty",
            ));
        }

        Ok(())
    }

    /// Builds the Graph client settings.
    ///
    /// # Errors
    ///
    /// Returns an error if no access token is configured.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let ig = &self.instagram;
        let token = ig
            .access_token
            .clone()
            .ok_or(ConfigError::MissingAccessToken)?;

        let credentials = Credentials {
            access_token: token,
            business_account_id: ig.business_account_id.clone(),
            app_id: ig.app_id.clone(),
            api_base_url: ig.api_base_url.trim_end_matches('/').to_string(),
            api_version: ig.api_version.clone(),
            messaging_api_version: ig.messaging_api_version.clone(),
        };

        let limits = &self.rate_limit;
        Ok(ClientConfig {
            credentials,
            cache: CachePolicy {
                enabled: self.cache.enabled,
                ttl: Duration::from_secs(self.cache.ttl_seconds),
                max_entries: self.cache.max_entries,
            },
            limits: RateLimits {
                requests_per_hour: limits.requests_per_hour,
                posts_per_day: limits.posts_per_day,
            },
            backoff: BackoffPolicy {
                enabled: limits.enable_backoff,
                max_retries: limits.max_retries,
                base_delay: Duration::from_millis(limits.base_delay_ms),
                max_delay: Duration::from_millis(limits.max_delay_ms),
            },
            http: HttpSettings {
                timeout: Duration::from_secs(self.http.timeout_seconds),
                max_idle_connections: self.http.max_idle_connections,
            },
            publishing: PublishingRules {
                allowed_image_formats: lowercase(&self.publishing.allowed_image_formats),
                allowed_video_formats: lowercase(&self.publishing.allowed_video_formats),
            },
        })
    }
}

fn is_api_version(version: &str) -> bool {
    version
        .strip_prefix('v')
        .and_then(|rest| rest.split_once('.'))
        .is_some_and(|(major, minor)| {
            !major.is_empty()
                && !minor.is_empty()
                && major.chars().all(|c| c.is_ascii_digit())
                && minor.chars().all(|c| c.is_ascii_digit())
        })
}

fn lowercase(formats: &[String]) -> Vec<String> {
    formats
        .iter()
        .map(|f| f.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

/// Instagram account and Graph API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstagramConfig {
    /// Long-lived access token.
    #[serde(default)]
    pub access_token: Option<SecretString>,

    /// Business account used when a tool call names none.
    #[serde(default)]
    pub business_account_id: Option<String>,

    /// Facebook app id.
    #[serde(default)]
    pub app_id: Option<String>,

    /// Facebook app secret.
    #[serde(default)]
    pub app_secret: Option<SecretString>,

    /// Graph API host.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Graph API version, e.g. "v19.0".
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Graph API version used for messaging endpoints.
    #[serde(default = "default_messaging_api_version")]
    pub messaging_api_version: String,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            business_account_id: None,
            app_id: None,
            app_secret: None,
            api_base_url: default_api_base_url(),
            api_version: default_api_version(),
            messaging_api_version: default_messaging_api_version(),
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_messaging_api_version() -> String {
    DEFAULT_MESSAGING_API_VERSION.to_string()
}

/// Quota and backoff configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests allowed per rolling hour.
    /// Default: 200
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u32,

    /// Publishes allowed per rolling day.
    /// Default: 25
    #[serde(default = "default_posts_per_day")]
    pub posts_per_day: u32,

    /// Wait and retry when a quota is exhausted.
    #[serde(default = "default_true")]
    pub enable_backoff: bool,

    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Longest backoff delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_hour: default_requests_per_hour(),
            posts_per_day: default_posts_per_day(),
            enable_backoff: default_true(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

const fn default_requests_per_hour() -> u32 {
    200
}

const fn default_posts_per_day() -> u32 {
    25
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    30_000
}

const fn default_true() -> bool {
    true
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds a response stays fresh.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            ttl_seconds: default_ttl_seconds(),
            max_entries: default_max_entries(),
        }
    }
}

const fn default_ttl_seconds() -> u64 {
    300
}

const fn default_max_entries() -> usize {
    1024
}

/// HTTP connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Idle pooled connections kept per host.
    #[serde(default = "default_max_idle_connections")]
    pub max_idle_connections: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            max_idle_connections: default_max_idle_connections(),
        }
    }
}

const fn default_timeout_seconds() -> u64 {
    30
}

const fn default_max_idle_connections() -> usize {
    5
}

/// Publishing checks.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishingConfig {
    /// Accepted image extensions.
    #[serde(default = "default_image_formats")]
    pub allowed_image_formats: Vec<String>,

    /// Accepted video extensions.
    #[serde(default = "default_video_formats")]
    pub allowed_video_formats: Vec<String>,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            allowed_image_formats: default_image_formats(),
            allowed_video_formats: default_video_formats(),
        }
    }
}

fn default_image_formats() -> Vec<String> {
    PublishingRules::default().allowed_image_formats
}

fn default_video_formats() -> Vec<String> {
    PublishingRules::default().allowed_video_formats
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Append log lines to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.instagram.access_token.is_none());
        assert_eq!(config.instagram.api_version, "v19.0");
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "instagram": {
                "access_token": "EAAB-test",
                "business_account_id": "17841400000000000",
                "app_id": "1234",
                "app_secret": "shh",
                "api_version": "v20.0"
            },
            "rate_limit": {
                "requests_per_hour": 100,
                "posts_per_day": 10,
                "enable_backoff": false,
                "max_retries": 1
            },
            "cache": {
                "enabled": true,
                "ttl_seconds": 60,
                "max_entries": 16
            },
            "http": {
                "timeout_seconds": 10
            },
            "publishing": {
                "allowed_image_formats": [".JPG", "png"]
            },
            "logging": {
                "level": "debug",
                "format": "json",
                "file": "/var/log/instagram-mcp.log"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.logging.file.as_deref(),
            Some(std::path::Path::new("/var/log/instagram-mcp.log"))
        );

        let client = config.client_config().unwrap();
        assert_eq!(client.credentials.access_token.expose_secret(), "EAAB-test");
        assert_eq!(client.credentials.api_version, "v20.0");
        assert_eq!(client.credentials.messaging_api_version, "v22.0");
        assert_eq!(client.limits.requests_per_hour, 100);
        assert!(!client.backoff.enabled);
        assert_eq!(client.cache.ttl, Duration::from_secs(60));
        assert_eq!(client.http.timeout, Duration::from_secs(10));
        assert_eq!(client.publishing.allowed_image_formats, vec!["jpg", "png"]);
        assert_eq!(client.publishing.allowed_video_formats, vec!["mp4", "mov"]);
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, LogFormat::Text);
        assert!(config.file.is_none());
    }

    #[test]
    fn reject_empty_log_file() {
        let config: Config = serde_json::from_str(r#"{"logging": {"file": ""}}"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                setting: "logging.file",
                ..
            })
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: Config = serde_json::from_str(
            r#"{"instagram": {"access_token": "from-file", "business_account_id": "1"}}"#,
        )
        .unwrap();
        config.apply_env_overrides(env(&[
            (ENV_ACCESS_TOKEN, "from-env"),
            (ENV_API_VERSION, "v21.0"),
            (ENV_BUSINESS_ACCOUNT_ID, "  "),
        ]));

        let ig = &config.instagram;
        assert_eq!(ig.access_token.as_ref().unwrap().expose_secret(), "from-env");
        assert_eq!(ig.api_version, "v21.0");
        // Blank values do not override.
        assert_eq!(ig.business_account_id.as_deref(), Some("1"));
    }

    #[test]
    fn missing_token_fails_client_config() {
        let config = Config::default();
        let err = config.client_config().unwrap_err();
        assert!(matches!(err, ConfigError::MissingAccessToken));
        assert!(err.to_string().contains(ENV_ACCESS_TOKEN));
    }

    #[test]
    fn env_token_satisfies_client_config() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[(ENV_ACCESS_TOKEN, "from-env")]));
        assert!(config.validate().is_ok());
        assert!(config.client_config().is_ok());
    }

    #[test]
    fn reject_blank_secrets() {
        let mut config: Config =
            serde_json::from_str(r#"{"instagram": {"app_id": "1234", "app_secret": " "}}"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptySecret {
                setting: "instagram.app_secret"
            })
        ));

        config.instagram.app_secret = None;
        config.instagram.access_token = Some(SecretString::from(""));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptySecret {
                setting: "instagram.access_token"
            })
        ));
    }

    #[test]
    fn reject_invalid_api_version() {
        let mut config = Config::default();
        config.instagram.messaging_api_version = "19".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ApiVersion {
                setting: "instagram.messaging_api_version",
                ..
            }
        ));
        assert!(err.to_string().contains("'19'"));
    }

    #[test]
    fn reject_zero_ceiling() {
        let config: Config =
            serde_json::from_str(r#"{"rate_limit": {"requests_per_hour": 0}}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_secret_without_app_id() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[(ENV_APP_SECRET, "shh")]));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AppSecretWithoutAppId)
        ));
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config: Config =
            serde_json::from_str(r#"{"instagram": {"access_token": "EAAB-very-secret"}}"#).unwrap();
        assert!(!format!("{config:?}").contains("EAAB-very-secret"));
    }

    #[test]
    fn version_format() {
        assert!(is_api_version("v19.0"));
        assert!(is_api_version("v22.10"));
        assert!(!is_api_version("v19"));
        assert!(!is_api_version("19.0"));
        assert!(!is_api_version("v.0"));
    }
}
