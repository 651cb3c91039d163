//! Immutable settings for a [`GraphClient`](crate::graph::GraphClient).
//!
//! Each client owns its own copy, so several clients (one per account, one
//! per test) can coexist without sharing state.

use std::time::Duration;

use secrecy::SecretString;

use crate::graph::rate_limit::BackoffPolicy;
use crate::graph::transport::HttpSettings;

/// Default Graph API host.
pub const DEFAULT_API_BASE_URL: &str = "https://graph.facebook.com";

/// Default Graph API version for standard-tier endpoints.
pub const DEFAULT_API_VERSION: &str = "v19.0";

/// Default Graph API version for messaging endpoints.
pub const DEFAULT_MESSAGING_API_VERSION: &str = "v22.0";

/// Longest caption Instagram accepts, in characters.
pub const MAX_CAPTION_LENGTH: usize = 2200;

/// Account credentials and API location.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Long-lived user or page access token.
    pub access_token: SecretString,
    /// Instagram business account used when a call names none.
    pub business_account_id: Option<String>,
    /// Facebook app id, reported in status output.
    pub app_id: Option<String>,
    /// Graph API host, without trailing slash.
    pub api_base_url: String,
    /// Version segment for standard-tier endpoints.
    pub api_version: String,
    /// Version segment for messaging endpoints.
    pub messaging_api_version: String,
}

impl Credentials {
    /// Credentials for `access_token` against the default Graph host.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            business_account_id: None,
            app_id: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            messaging_api_version: DEFAULT_MESSAGING_API_VERSION.to_string(),
        }
    }

    /// Sets the default business account.
    #[must_use]
    pub fn with_business_account(mut self, account_id: impl Into<String>) -> Self {
        self.business_account_id = Some(account_id.into());
        self
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
            max_entries: 1024,
        }
    }
}

/// Quota ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub requests_per_hour: u32,
    pub posts_per_day: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            requests_per_hour: 200,
            posts_per_day: 25,
        }
    }
}

/// Local checks applied before publishing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishingRules {
    /// Accepted image file extensions (lowercase).
    pub allowed_image_formats: Vec<String>,
    /// Accepted video file extensions (lowercase).
    pub allowed_video_formats: Vec<String>,
}

impl Default for PublishingRules {
    fn default() -> Self {
        Self {
            allowed_image_formats: ["jpg", "jpeg", "png", "gif"]
                .map(String::from)
                .to_vec(),
            allowed_video_formats: ["mp4", "mov"].map(String::from).to_vec(),
        }
    }
}

/// Everything a client needs, fixed at construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credentials: Credentials,
    pub cache: CachePolicy,
    pub limits: RateLimits,
    pub backoff: BackoffPolicy,
    pub http: HttpSettings,
    pub publishing: PublishingRules,
}

impl ClientConfig {
    /// Default settings for `credentials`.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            cache: CachePolicy::default(),
            limits: RateLimits::default(),
            backoff: BackoffPolicy::default(),
            http: HttpSettings::default(),
            publishing: PublishingRules::default(),
        }
    }
}
