//! Error types for Graph API operations.
//!
//! Every failure the client can produce maps onto one [`GraphError`] variant.
//! Variants that originate upstream carry the platform's error body so callers
//! can show the exact code and message to the user.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Result type for Graph API operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Graph error code returned when a messaging call lacks Advanced Access.
///
/// Meta reports missing `instagram_manage_messages` approval as a generic
/// "temporarily unavailable" error (code 2) on messaging endpoints.
pub const ADVANCED_ACCESS_ERROR_CODE: i64 = 2;

/// Subcodes Meta returns when a reply falls outside the 24-hour messaging window.
pub const MESSAGING_WINDOW_SUBCODES: [i64; 2] = [2_018_278, 2_534_022];

/// Permission tier an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessTier {
    /// Default scopes: profile, media, insights, publishing, pages.
    #[default]
    Standard,
    /// Advanced Access scopes: direct messaging.
    Advanced,
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("standard"),
            Self::Advanced => f.write_str("advanced"),
        }
    }
}

/// Which quota a rate-limit failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    /// Local rolling hourly request ceiling.
    Requests,
    /// Local rolling daily publish ceiling.
    Publishing,
    /// Throttling signalled by the platform itself.
    Upstream,
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requests => f.write_str("hourly request quota"),
            Self::Publishing => f.write_str("daily publishing quota"),
            Self::Upstream => f.write_str("platform rate limit"),
        }
    }
}

/// The `error` object of a Graph API error response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiErrorDetail {
    /// Human-readable message, passed through verbatim.
    #[serde(default)]
    pub message: String,
    /// Error type, e.g. `OAuthException`.
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
    /// Numeric error code.
    #[serde(default)]
    pub code: Option<i64>,
    /// Numeric error subcode.
    #[serde(default)]
    pub error_subcode: Option<i64>,
    /// Trace id for Meta support requests.
    #[serde(default)]
    pub fbtrace_id: Option<String>,
}

impl ApiErrorDetail {
    /// Creates a detail with only a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Whether the subcode marks a rejected reply outside the messaging window.
    #[must_use]
    pub fn is_messaging_window(&self) -> bool {
        self.error_subcode
            .is_some_and(|s| MESSAGING_WINDOW_SUBCODES.contains(&s))
    }
}

impl fmt::Display for ApiErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        match (self.code, self.error_subcode) {
            (Some(code), Some(sub)) => write!(f, " (code {code}, subcode {sub})"),
            (Some(code), None) => write!(f, " (code {code})"),
            _ => Ok(()),
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorDetail,
}

/// Errors that can occur while talking to the Graph API.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The access token is invalid or expired.
    #[error("authentication failed: {detail}")]
    Authentication {
        /// Upstream error body.
        detail: ApiErrorDetail,
    },

    /// The token lacks a required permission.
    #[error("permission denied ({tier} access): {detail}")]
    Permission {
        /// Tier of the rejected endpoint.
        tier: AccessTier,
        /// Upstream error body.
        detail: ApiErrorDetail,
    },

    /// A quota was exhausted and retries did not help.
    #[error("rate limit exceeded ({quota}) after {attempts} attempt(s)")]
    RateLimited {
        /// The quota that was exhausted.
        quota: Quota,
        /// How long until a slot frees up, when known.
        retry_after: Option<Duration>,
        /// Number of attempts made.
        attempts: u32,
        /// Upstream error body, when the platform signalled the limit.
        detail: Option<ApiErrorDetail>,
    },

    /// Input parameters were rejected locally or by the platform.
    #[error("invalid request: {message}")]
    Validation {
        /// Description of what's wrong.
        message: String,
        /// Upstream error body, when the platform rejected the input.
        detail: Option<ApiErrorDetail>,
    },

    /// Unclassified non-success response.
    #[error("upstream error (HTTP {status}): {detail}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Upstream error body.
        detail: ApiErrorDetail,
    },

    /// Transport failure after retries were exhausted.
    #[error("network error after {attempts} attempt(s): {message}")]
    Network {
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last transport failure.
        message: String,
    },
}

impl GraphError {
    /// Creates a local validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            detail: None,
        }
    }

    /// Short machine-readable name of the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "authentication",
            Self::Permission { .. } => "permission",
            Self::RateLimited { .. } => "rate_limited",
            Self::Validation { .. } => "validation",
            Self::Upstream { .. } => "upstream",
            Self::Network { .. } => "network",
        }
    }

    /// The upstream error body, if this error came from the platform.
    #[must_use]
    pub const fn detail(&self) -> Option<&ApiErrorDetail> {
        match self {
            Self::Authentication { detail }
            | Self::Permission { detail, .. }
            | Self::Upstream { detail, .. } => Some(detail),
            Self::RateLimited { detail, .. } | Self::Validation { detail, .. } => detail.as_ref(),
            Self::Network { .. } => None,
        }
    }

    /// Whether the call failed because Advanced Access has not been granted.
    #[must_use]
    pub const fn requires_advanced_access(&self) -> bool {
        matches!(
            self,
            Self::Permission {
                tier: AccessTier::Advanced,
                ..
            }
        )
    }

    /// Classifies a non-success HTTP response.
    ///
    /// `body` is the raw response body; bodies that are not a Graph error
    /// envelope still produce an error, with the body text as the message.
    #[must_use]
    pub fn from_response(status: u16, body: &[u8], tier: AccessTier) -> Self {
        let detail = serde_json::from_slice::<ErrorEnvelope>(body).map_or_else(
            |_| ApiErrorDetail::message(String::from_utf8_lossy(body).trim().to_string()),
            |envelope| envelope.error,
        );
        classify(status, detail, tier)
    }
}

fn classify(status: u16, detail: ApiErrorDetail, tier: AccessTier) -> GraphError {
    let code = detail.code;

    if status == 429 || matches!(code, Some(4 | 17 | 32 | 613)) {
        return GraphError::RateLimited {
            quota: Quota::Upstream,
            retry_after: None,
            attempts: 1,
            detail: Some(detail),
        };
    }

    if status == 401 || matches!(code, Some(102 | 190)) {
        return GraphError::Authentication { detail };
    }

    // Replies outside the 24h window are passed through as-is.
    if detail.is_messaging_window() {
        return GraphError::Upstream { status, detail };
    }

    let permission_code = matches!(code, Some(10 | 200..=299));
    if tier == AccessTier::Advanced
        && (permission_code || matches!(code, Some(ADVANCED_ACCESS_ERROR_CODE | 3)))
    {
        return GraphError::Permission { tier, detail };
    }
    if permission_code || status == 403 {
        return GraphError::Permission {
            tier: AccessTier::Standard,
            detail,
        };
    }

    if code == Some(100) {
        return GraphError::Validation {
            message: detail.message.clone(),
            detail: Some(detail),
        };
    }

    GraphError::Upstream { status, detail }
}
