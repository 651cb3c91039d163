//! Rate-limited, cached client for the Instagram Graph API.
//!
//! Every operation goes through the same pipeline:
//!
//! 1. Serve cacheable GETs from the [`ResponseCache`] while the entry is live.
//! 2. Reserve a slot in the hourly request window, backing off if it is full.
//! 3. Send with bearer auth, retrying transport failures with backoff.
//! 4. Classify non-success responses into [`GraphError`]; only platform rate
//!    limits are retried.
//! 5. Parse the typed record and cache the raw payload.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::graph::cache::{cache_key, ResponseCache};
use crate::graph::config::{ClientConfig, MAX_CAPTION_LENGTH};
use crate::graph::error::{AccessTier, ApiErrorDetail, GraphError, GraphResult, Quota};
use crate::graph::models::{
    AccountInsight, ClientStatus, Conversation, Created, DirectMessage, FacebookPage,
    InsightMetric, InsightPeriod, InstagramMedia, InstagramProfile, ListEnvelope, MediaInsight,
    MediaPage, PublishMediaRequest, PublishMediaResponse, SendMessageRequest,
    SendMessageResponse, TokenStatus, DEFAULT_ACCOUNT_METRICS,
};
use crate::graph::rate_limit::RateLimiter;
use crate::graph::transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, RequestBody,
    TransportErrorKind,
};

const PROFILE_FIELDS: &str = "id,username,name,biography,website,profile_picture_url,\
                              followers_count,follows_count,media_count";
const MEDIA_FIELDS: &str = "id,media_type,media_url,permalink,thumbnail_url,caption,\
                            timestamp,like_count,comments_count";
const PAGE_FIELDS: &str = "id,name,category,instagram_business_account";
const CONVERSATION_FIELDS: &str = "id,updated_time,message_count";
const MESSAGE_FIELDS: &str = "messages{id,from,to,message,created_time,attachments}";

/// Largest page size the Graph API accepts for list endpoints.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size used when a caller does not specify one.
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Description of one Graph API call.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRequest {
    pub method: Method,
    /// Path below the version segment, e.g. `1784.../media`.
    pub endpoint: String,
    /// Query parameters.
    pub params: BTreeMap<String, Value>,
    pub body: Option<RequestBody>,
    pub tier: AccessTier,
    /// Whether a GET may be served from and stored in the cache.
    pub cacheable: bool,
}

impl GraphRequest {
    /// A cacheable standard-tier GET.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
            body: None,
            tier: AccessTier::Standard,
            cacheable: true,
        }
    }

    /// A standard-tier POST.
    pub fn post(endpoint: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method: Method::Post,
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
            body: Some(body),
            tier: AccessTier::Standard,
            cacheable: false,
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// Marks the request as an Advanced Access (messaging) call.
    #[must_use]
    pub fn advanced(mut self) -> Self {
        self.tier = AccessTier::Advanced;
        self
    }

    /// Bypasses the cache for this request.
    #[must_use]
    pub fn uncached(mut self) -> Self {
        self.cacheable = false;
        self
    }

    /// Cache key derived from the endpoint and parameters.
    #[must_use]
    pub fn cache_key(&self) -> String {
        cache_key(&self.endpoint, &self.params)
    }

    fn is_cacheable(&self) -> bool {
        self.cacheable && self.method == Method::Get
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn decode<T: DeserializeOwned>(value: Value, status: u16) -> GraphResult<T> {
    serde_json::from_value(value).map_err(|e| GraphError::Upstream {
        status,
        detail: ApiErrorDetail::message(format!("unexpected response shape: {e}")),
    })
}

/// Rejects ids that would change the request path.
fn node_id<'a>(name: &str, id: &'a str) -> GraphResult<&'a str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(GraphError::validation(format!("{name} must not be empty")));
    }
    if id
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '&'))
    {
        return Err(GraphError::validation(format!(
            "{name} contains invalid characters: '{id}'"
        )));
    }
    Ok(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Image,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Video => f.write_str("video"),
        }
    }
}

fn check_media_url(url: &str, kind: MediaKind, allowed: &[String]) -> GraphResult<()> {
    let parsed = Url::parse(url)
        .map_err(|e| GraphError::validation(format!("{kind}_url is not a valid URL: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(GraphError::validation(format!(
            "{kind}_url must be a publicly accessible http(s) URL"
        )));
    }

    let extension = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    // CDN URLs often have no extension; only a present one is checked.
    if let Some(ext) = extension {
        if !allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
            return Err(GraphError::validation(format!(
                "unsupported {kind} format '.{ext}'; allowed: {}",
                allowed.join(", ")
            )));
        }
    }

    Ok(())
}

/// Feed aspect ratios (width / height) the platform accepts for images.
const ASPECT_RATIOS: [f64; 3] = [0.8, 1.0, 1.91];
const ASPECT_RATIO_TOLERANCE: f64 = 0.02;

#[allow(clippy::cast_precision_loss)] // pixel dimensions are far below 2^52
fn check_aspect_ratio(width: usize, height: usize) -> GraphResult<()> {
    if width == 0 || height == 0 {
        return Err(GraphError::validation(format!(
            "image has no usable dimensions ({width}x{height})"
        )));
    }

    let ratio = width as f64 / height as f64;
    if ASPECT_RATIOS
        .iter()
        .any(|accepted| (ratio - accepted).abs() <= ASPECT_RATIO_TOLERANCE + f64::EPSILON)
    {
        return Ok(());
    }

    Err(GraphError::validation(format!(
        "image aspect ratio {width}:{height} (ratio {ratio:.2}) is not supported by Instagram; \
         accepted ratios are 4:5 (portrait, ~0.8), 1:1 (square, 1.0) and 1.91:1 \
         (landscape, ~1.91). Crop or resize the image to one of these ratios"
    )))
}

#[derive(Deserialize)]
struct TokenOwner {
    id: String,
}

#[derive(Deserialize)]
struct ConversationMessages {
    #[serde(default)]
    messages: Option<ListEnvelope<DirectMessage>>,
}

#[derive(Deserialize)]
struct MessageSent {
    message_id: String,
    #[serde(default)]
    recipient_id: Option<String>,
}

/// Client for one Instagram business account.
pub struct GraphClient {
    transport: Arc<dyn HttpTransport>,
    config: ClientConfig,
    cache: ResponseCache,
    limiter: RateLimiter,
}

impl fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphClient")
            .field("config", &self.config)
            .field("cached_responses", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    /// Creates a client with a pooled HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Network`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> GraphResult<Self> {
        let transport = ReqwestTransport::new(config.http).map_err(|e| GraphError::Network {
            attempts: 0,
            message: e.to_string(),
        })?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Creates a client over an existing transport.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let cache = ResponseCache::new(config.cache.max_entries);
        let limiter = RateLimiter::new(config.limits.requests_per_hour, config.limits.posts_per_day);

        info!(
            api_version = %config.credentials.api_version,
            cache_enabled = config.cache.enabled,
            requests_per_hour = config.limits.requests_per_hour,
            "Graph client initialised"
        );

        Self {
            transport,
            config,
            cache,
            limiter,
        }
    }

    /// The client's settings.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Releases the transport and drops cached responses.
    pub fn close(self) {
        let cached = self.cache.len();
        self.cache.clear();
        info!(cached_responses = cached, "Graph client closed");
    }

    /// Sends `request` and decodes the response as `T`, using the cache.
    ///
    /// # Errors
    ///
    /// Returns any [`GraphError`] produced by the pipeline, or
    /// [`GraphError::Upstream`] if the body does not match `T`.
    pub async fn fetch<T: DeserializeOwned>(&self, request: &GraphRequest) -> GraphResult<T> {
        let key = (self.config.cache.enabled && request.is_cacheable()).then(|| request.cache_key());

        if let Some(key) = &key {
            if let Some(hit) = self.cache.get(key) {
                debug!(endpoint = %request.endpoint, "Cache hit");
                return decode(hit, 200);
            }
        }

        let value = self.execute(request).await?;
        let parsed = decode(value.clone(), 200)?;

        if let Some(key) = key {
            self.cache.put(key, value, self.config.cache.ttl);
        }

        Ok(parsed)
    }

    /// Sends `request` without consulting the cache and returns the JSON body.
    ///
    /// # Errors
    ///
    /// Returns the classified [`GraphError`] for failed calls.
    pub async fn execute(&self, request: &GraphRequest) -> GraphResult<Value> {
        let http = self.compose(request);
        let policy = &self.config.backoff;
        let mut throttled: u32 = 0;

        loop {
            let response = self.send_with_retry(&http).await?;

            let error = if response.is_success() {
                let value: Value =
                    serde_json::from_slice(&response.body).map_err(|e| GraphError::Upstream {
                        status: response.status,
                        detail: ApiErrorDetail::message(format!("invalid JSON response: {e}")),
                    })?;
                if !value.get("error").is_some_and(Value::is_object) {
                    debug!(endpoint = %request.endpoint, status = response.status, "Graph API request succeeded");
                    return Ok(value);
                }
                GraphError::from_response(response.status, &response.body, request.tier)
            } else {
                GraphError::from_response(response.status, &response.body, request.tier)
            };

            match error {
                GraphError::RateLimited { .. } if policy.enabled && throttled < policy.max_retries => {
                    let delay = policy.delay(throttled);
                    warn!(
                        endpoint = %request.endpoint,
                        attempt = throttled + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Platform rate limit hit, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    throttled += 1;
                }
                GraphError::RateLimited { detail, .. } => {
                    return Err(GraphError::RateLimited {
                        quota: Quota::Upstream,
                        retry_after: None,
                        attempts: throttled + 1,
                        detail,
                    });
                }
                other => {
                    warn!(
                        endpoint = %request.endpoint,
                        status = response.status,
                        kind = other.kind(),
                        "Graph API request failed"
                    );
                    return Err(other);
                }
            }
        }
    }

    fn compose(&self, request: &GraphRequest) -> HttpRequest {
        let credentials = &self.config.credentials;
        let version = match request.tier {
            AccessTier::Standard => &credentials.api_version,
            AccessTier::Advanced => &credentials.messaging_api_version,
        };

        HttpRequest {
            method: request.method,
            url: format!(
                "{}/{}/{}",
                credentials.api_base_url.trim_end_matches('/'),
                version,
                request.endpoint.trim_start_matches('/')
            ),
            query: request
                .params
                .iter()
                .map(|(name, value)| (name.clone(), query_value(value)))
                .collect(),
            body: request.body.clone(),
            bearer_token: Some(credentials.access_token.clone()),
        }
    }

    /// Sends with bounded retries on transport failure.
    ///
    /// Each attempt takes a request permit; the permit is committed once the
    /// attempt has completed either way. A POST is only retried when the
    /// connection was never established, since a timed out POST may already
    /// have been applied upstream.
    async fn send_with_retry(&self, http: &HttpRequest) -> GraphResult<HttpResponse> {
        let policy = &self.config.backoff;
        let mut attempt: u32 = 0;

        loop {
            let permit = self.limiter.acquire(Quota::Requests, policy).await?;
            debug!(method = %http.method, url = %http.url, attempt = attempt + 1, "Sending Graph API request");

            let outcome = self.transport.send(http).await;
            permit.commit();

            match outcome {
                Ok(response) => return Ok(response),
                Err(err) => {
                    attempt += 1;
                    let replayable =
                        http.method == Method::Get || err.kind == TransportErrorKind::Connect;
                    if !replayable {
                        error!(url = %http.url, error = %err, "POST outcome unknown, not retrying");
                        return Err(GraphError::Network {
                            attempts: attempt,
                            message: err.message,
                        });
                    }
                    if attempt > policy.max_retries {
                        error!(url = %http.url, attempts = attempt, error = %err, "Graph API unreachable");
                        return Err(GraphError::Network {
                            attempts: attempt,
                            message: err.message,
                        });
                    }

                    let delay = policy.delay(attempt - 1);
                    warn!(
                        url = %http.url,
                        attempt,
                        error = %err,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Transport failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn account_id<'a>(&'a self, account_id: Option<&'a str>) -> GraphResult<&'a str> {
        let id = account_id
            .filter(|id| !id.trim().is_empty())
            .or(self.config.credentials.business_account_id.as_deref())
            .ok_or_else(|| {
                GraphError::validation("Instagram business account ID not configured")
            })?;
        node_id("account_id", id)
    }

    /// Fetches the business profile.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] if no account id is available.
    pub async fn get_profile(&self, account_id: Option<&str>) -> GraphResult<InstagramProfile> {
        let account_id = self.account_id(account_id)?;
        let request = GraphRequest::get(account_id).param("fields", PROFILE_FIELDS);
        self.fetch(&request).await
    }

    /// Lists recent media, newest first. `limit` is clamped to 1..=100.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] if no account id is available.
    pub async fn get_media_posts(
        &self,
        account_id: Option<&str>,
        limit: u32,
        after: Option<&str>,
    ) -> GraphResult<MediaPage> {
        let account_id = self.account_id(account_id)?;
        let mut request = GraphRequest::get(format!("{account_id}/media"))
            .param("fields", MEDIA_FIELDS)
            .param("limit", limit.clamp(1, MAX_PAGE_SIZE));
        if let Some(after) = after.filter(|a| !a.is_empty()) {
            request = request.param("after", after);
        }

        let envelope: ListEnvelope<InstagramMedia> = self.fetch(&request).await?;
        let after = envelope.next_cursor();
        Ok(MediaPage {
            media: envelope.data,
            after,
        })
    }

    /// Fetches one media object by id.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for an empty or malformed id.
    pub async fn get_media(&self, media_id: &str) -> GraphResult<InstagramMedia> {
        let media_id = node_id("media_id", media_id)?;
        let request = GraphRequest::get(media_id).param("fields", MEDIA_FIELDS);
        self.fetch(&request).await
    }

    /// Fetches insights for one media object.
    ///
    /// An empty `metrics` slice requests reach, likes, comments, shares and saved.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for an empty or malformed id.
    pub async fn get_media_insights(
        &self,
        media_id: &str,
        metrics: &[InsightMetric],
    ) -> GraphResult<Vec<MediaInsight>> {
        let media_id = node_id("media_id", media_id)?;
        let metrics: &[InsightMetric] = if metrics.is_empty() {
            &InsightMetric::DEFAULT_MEDIA
        } else {
            metrics
        };
        let metric = metrics
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let request = GraphRequest::get(format!("{media_id}/insights")).param("metric", metric);
        let envelope: ListEnvelope<MediaInsight> = self.fetch(&request).await?;
        Ok(envelope.data)
    }

    /// Creates a media container and publishes it.
    ///
    /// The daily publishing slot is only consumed when the publish step
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for bad input and
    /// [`GraphError::RateLimited`] when the daily quota is used up.
    pub async fn publish_media(
        &self,
        request: &PublishMediaRequest,
    ) -> GraphResult<PublishMediaResponse> {
        let account_id = self.account_id(None)?;
        let (kind, media_url) = self.validate_publish(request)?;
        if kind == MediaKind::Image {
            self.check_image_dimensions(media_url).await?;
        }

        let publish_permit = self
            .limiter
            .acquire(Quota::Publishing, &self.config.backoff)
            .await?;

        let mut container = BTreeMap::new();
        match kind {
            MediaKind::Image => {
                container.insert("image_url".to_string(), media_url.to_string());
            }
            MediaKind::Video => {
                container.insert("video_url".to_string(), media_url.to_string());
                container.insert("media_type".to_string(), "REELS".to_string());
            }
        }
        container.insert(
            "caption".to_string(),
            request.caption.clone().unwrap_or_default(),
        );
        if let Some(location_id) = request.location_id.as_deref().filter(|l| !l.is_empty()) {
            container.insert("location_id".to_string(), location_id.to_string());
        }

        let created: Created = self
            .fetch(&GraphRequest::post(
                format!("{account_id}/media"),
                RequestBody::Form(container),
            ))
            .await?;
        debug!(container_id = %created.id, "Media container created");

        let publish = BTreeMap::from([("creation_id".to_string(), created.id.clone())]);
        let published: Created = self
            .fetch(&GraphRequest::post(
                format!("{account_id}/media_publish"),
                RequestBody::Form(publish),
            ))
            .await?;
        publish_permit.commit();

        info!(media_id = %published.id, %kind, "Media published");
        Ok(PublishMediaResponse {
            id: published.id,
            container_id: created.id,
            status: "published",
        })
    }

    fn validate_publish<'r>(
        &self,
        request: &'r PublishMediaRequest,
    ) -> GraphResult<(MediaKind, &'r str)> {
        let image = request.image_url.as_deref().filter(|u| !u.trim().is_empty());
        let video = request.video_url.as_deref().filter(|u| !u.trim().is_empty());
        let rules = &self.config.publishing;

        let (kind, url) = match (image, video) {
            (Some(url), None) => (MediaKind::Image, url),
            (None, Some(url)) => (MediaKind::Video, url),
            (Some(_), Some(_)) => {
                return Err(GraphError::validation(
                    "provide either image_url or video_url, not both",
                ))
            }
            (None, None) => {
                return Err(GraphError::validation(
                    "either image_url or video_url is required",
                ))
            }
        };

        let allowed = match kind {
            MediaKind::Image => &rules.allowed_image_formats,
            MediaKind::Video => &rules.allowed_video_formats,
        };
        check_media_url(url, kind, allowed)?;

        if let Some(caption) = &request.caption {
            let length = caption.chars().count();
            if length > MAX_CAPTION_LENGTH {
                return Err(GraphError::validation(format!(
                    "caption is {length} characters; the limit is {MAX_CAPTION_LENGTH}"
                )));
            }
        }

        Ok((kind, url))
    }

    /// Downloads the image once and rejects aspect ratios the feed refuses.
    ///
    /// The download goes to the media host, so it carries no token and takes
    /// no Graph API request slot.
    async fn check_image_dimensions(&self, url: &str) -> GraphResult<()> {
        let download = HttpRequest {
            method: Method::Get,
            url: url.to_string(),
            query: Vec::new(),
            body: None,
            bearer_token: None,
        };

        let response = self.transport.send(&download).await.map_err(|e| {
            GraphError::validation(format!(
                "failed to download image for validation: {}",
                e.message
            ))
        })?;
        if !response.is_success() {
            return Err(GraphError::validation(format!(
                "failed to download image for validation: HTTP {}",
                response.status
            )));
        }

        let size = imagesize::blob_size(&response.body).map_err(|e| {
            GraphError::validation(format!("could not read image dimensions: {e}"))
        })?;
        debug!(width = size.width, height = size.height, "Image dimensions read");
        check_aspect_ratio(size.width, size.height)
    }

    /// Lists Facebook pages connected to the token's user.
    ///
    /// # Errors
    ///
    /// Returns the classified [`GraphError`] on failure.
    pub async fn get_account_pages(&self) -> GraphResult<Vec<FacebookPage>> {
        let request = GraphRequest::get("me/accounts").param("fields", PAGE_FIELDS);
        let envelope: ListEnvelope<FacebookPage> = self.fetch(&request).await?;
        Ok(envelope.data)
    }

    /// Fetches account-level insights as totals over `period`.
    ///
    /// An empty `metrics` slice requests reach, profile views and website clicks.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] if no account id is available.
    pub async fn get_account_insights(
        &self,
        account_id: Option<&str>,
        metrics: &[String],
        period: InsightPeriod,
    ) -> GraphResult<Vec<AccountInsight>> {
        let account_id = self.account_id(account_id)?;
        let metric = if metrics.is_empty() {
            DEFAULT_ACCOUNT_METRICS.join(",")
        } else {
            metrics.join(",")
        };

        let request = GraphRequest::get(format!("{account_id}/insights"))
            .param("metric", metric)
            .param("period", period.as_str())
            .param("metric_type", "total_value");
        let envelope: ListEnvelope<AccountInsight> = self.fetch(&request).await?;
        Ok(envelope.data)
    }

    /// Checks the access token against `me`, bypassing the cache.
    ///
    /// A rejected token yields `valid: false`; other failures are errors.
    ///
    /// # Errors
    ///
    /// Returns any non-authentication [`GraphError`].
    pub async fn validate_access_token(&self) -> GraphResult<TokenStatus> {
        let request = GraphRequest::get("me").param("fields", "id").uncached();
        match self.fetch::<TokenOwner>(&request).await {
            Ok(owner) => Ok(TokenStatus {
                valid: true,
                user_id: Some(owner.id),
                reason: None,
            }),
            Err(GraphError::Authentication { detail }) => Ok(TokenStatus {
                valid: false,
                user_id: None,
                reason: Some(detail.message),
            }),
            Err(other) => Err(other),
        }
    }

    /// Lists Instagram direct-message threads of a page.
    ///
    /// Without `page_id` the first connected page is used.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Permission`] with the advanced tier until
    /// Advanced Access is approved.
    pub async fn get_conversations(
        &self,
        page_id: Option<&str>,
        limit: u32,
    ) -> GraphResult<Vec<Conversation>> {
        let page_id = match page_id.filter(|p| !p.trim().is_empty()) {
            Some(id) => node_id("page_id", id)?.to_string(),
            None => {
                let pages = self.get_account_pages().await?;
                let first = pages.into_iter().next().ok_or_else(|| {
                    GraphError::validation(
                        "No Facebook pages found. Connect a Facebook page to the Instagram account.",
                    )
                })?;
                debug!(page_id = %first.id, "Using first connected page for conversations");
                first.id
            }
        };

        let request = GraphRequest::get(format!("{page_id}/conversations"))
            .param("platform", "instagram")
            .param("fields", CONVERSATION_FIELDS)
            .param("limit", limit.clamp(1, MAX_PAGE_SIZE))
            .advanced();
        let envelope: ListEnvelope<Conversation> = self.fetch(&request).await?;
        Ok(envelope.data)
    }

    /// Lists messages of one conversation.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Permission`] with the advanced tier until
    /// Advanced Access is approved.
    pub async fn get_conversation_messages(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> GraphResult<Vec<DirectMessage>> {
        let conversation_id = node_id("conversation_id", conversation_id)?;
        let request = GraphRequest::get(conversation_id)
            .param("fields", MESSAGE_FIELDS)
            .param("limit", limit.clamp(1, MAX_PAGE_SIZE))
            .advanced();
        let thread: ConversationMessages = self.fetch(&request).await?;
        Ok(thread.messages.map(|m| m.data).unwrap_or_default())
    }

    /// Sends a direct message.
    ///
    /// Replies are only accepted within 24 hours of the recipient's last
    /// message; the platform's rejection is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] for empty input and
    /// [`GraphError::Permission`] without Advanced Access.
    pub async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> GraphResult<SendMessageResponse> {
        let recipient_id = node_id("recipient_id", &request.recipient_id)?;
        if request.message.trim().is_empty() {
            return Err(GraphError::validation("message must not be empty"));
        }

        let body = json!({
            "recipient": { "id": recipient_id },
            "message": { "text": request.message },
        });
        let sent: MessageSent = self
            .fetch(&GraphRequest::post("me/messages", RequestBody::Json(body)).advanced())
            .await?;

        info!(recipient = %recipient_id, "Direct message sent");
        Ok(SendMessageResponse {
            message_id: sent.message_id,
            recipient_id: sent.recipient_id.unwrap_or_else(|| recipient_id.to_string()),
        })
    }

    /// Rate limiter usage and cache occupancy.
    #[must_use]
    pub fn rate_limit_status(&self) -> ClientStatus {
        self.cache.sweep();
        ClientStatus {
            rate_limits: self.limiter.status(),
            cached_responses: self.cache.len(),
            app_id: self.config.credentials.app_id.clone(),
        }
    }
}
