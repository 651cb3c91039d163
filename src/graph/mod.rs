//! Instagram Graph API client.
//!
//! [`GraphClient`] wraps the platform's REST endpoints behind typed
//! operations. Responses are cached for a configurable TTL, outgoing calls
//! are held to rolling hourly and daily quotas, and platform errors are
//! classified into [`GraphError`] variants.
//!
//! # Example
//!
//! ```no_run
//! use instagram_mcp::graph::{ClientConfig, Credentials, GraphClient};
//!
//! # async fn run() -> instagram_mcp::graph::GraphResult<()> {
//! let credentials = Credentials::new("EAAB...").with_business_account("17841400000000000");
//! let client = GraphClient::new(ClientConfig::new(credentials))?;
//! let profile = client.get_profile(None).await?;
//! println!("{} has {:?} followers", profile.username, profile.followers_count);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod transport;

pub use client::{GraphClient, GraphRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use config::{CachePolicy, ClientConfig, Credentials, PublishingRules, RateLimits};
pub use error::{AccessTier, ApiErrorDetail, GraphError, GraphResult, Quota};
pub use models::{
    AccountInsight, ClientStatus, Conversation, DirectMessage, FacebookPage, InsightMetric,
    InsightPeriod, InstagramMedia, InstagramProfile, MediaInsight, MediaPage, MediaType,
    PublishMediaRequest, PublishMediaResponse, SendMessageRequest, SendMessageResponse,
    TokenStatus,
};
pub use rate_limit::{BackoffPolicy, RateLimitStatus, RateLimiter};
pub use transport::{
    HttpRequest, HttpResponse, HttpSettings, HttpTransport, Method, RequestBody, ReqwestTransport,
    TransportError, TransportErrorKind,
};
