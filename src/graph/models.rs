//! Typed records returned by the Graph API client.
//!
//! Field names follow the Graph API so records deserialise straight from
//! response bodies and serialise back out unchanged for tool results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::graph::rate_limit::RateLimitStatus;

/// Graph timestamps look like `2024-01-01T12:00:00+0000`.
const GRAPH_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

fn graph_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };

    DateTime::parse_from_rfc3339(&raw)
        .or_else(|_| DateTime::parse_from_str(&raw, GRAPH_TIMESTAMP_FORMAT))
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(serde::de::Error::custom)
}

/// Instagram business profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstagramProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub biography: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub followers_count: Option<u64>,
    #[serde(default)]
    pub follows_count: Option<u64>,
    #[serde(default)]
    pub media_count: Option<u64>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

/// Kind of media object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Image,
    Video,
    CarouselAlbum,
    /// Any type not known to this client (e.g. newer product types).
    #[serde(other)]
    Unknown,
}

/// A media post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstagramMedia {
    pub id: String,
    #[serde(default = "unknown_media_type")]
    pub media_type: MediaType,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default, deserialize_with = "graph_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub comments_count: Option<u64>,
}

const fn unknown_media_type() -> MediaType {
    MediaType::Unknown
}

impl InstagramMedia {
    /// Hashtags in the caption, in order of appearance.
    #[must_use]
    pub fn hashtags(&self) -> Vec<&str> {
        self.caption.as_deref().map_or_else(Vec::new, |caption| {
            hashtag_pattern()
                .find_iter(caption)
                .map(|m| m.as_str())
                .collect()
        })
    }
}

fn hashtag_pattern() -> &'static regex::Regex {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"#\w+").expect("hashtag pattern is valid"))
}

/// One page of media with the cursor for the next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaPage {
    pub media: Vec<InstagramMedia>,
    /// Pass as `after` to fetch the next page.
    pub after: Option<String>,
}

/// Insight metrics available for media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightMetric {
    Impressions,
    Reach,
    Likes,
    Comments,
    Shares,
    Saved,
    VideoViews,
    ProfileVisits,
    WebsiteClicks,
}

impl InsightMetric {
    /// Metrics requested when the caller names none.
    pub const DEFAULT_MEDIA: [Self; 5] = [
        Self::Reach,
        Self::Likes,
        Self::Comments,
        Self::Shares,
        Self::Saved,
    ];

    /// Graph API name of the metric.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Impressions => "impressions",
            Self::Reach => "reach",
            Self::Likes => "likes",
            Self::Comments => "comments",
            Self::Shares => "shares",
            Self::Saved => "saved",
            Self::VideoViews => "video_views",
            Self::ProfileVisits => "profile_visits",
            Self::WebsiteClicks => "website_clicks",
        }
    }
}

/// Aggregation period for insights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightPeriod {
    #[default]
    Day,
    Week,
    #[serde(rename = "days_28")]
    Days28,
    Lifetime,
}

impl InsightPeriod {
    /// Graph API name of the period.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Days28 => "days_28",
            Self::Lifetime => "lifetime",
        }
    }
}

/// Account metrics requested when the caller names none.
pub const DEFAULT_ACCOUNT_METRICS: [&str; 3] = ["reach", "profile_views", "website_clicks"];

/// Insight values for a media object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInsight {
    pub name: String,
    pub period: String,
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Insight values for an account, as a time series or a total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInsight {
    pub name: String,
    pub period: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_value: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

/// Reference to an Instagram business account linked to a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub id: String,
}

/// A Facebook page connected to the token's user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacebookPage {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub instagram_business_account: Option<AccountRef>,
}

/// A direct-message thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default, deserialize_with = "graph_timestamp")]
    pub updated_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message_count: Option<u64>,
}

/// Sender or recipient of a direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Graph wraps recipient lists as `{"data": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participants {
    #[serde(default)]
    pub data: Vec<Participant>,
}

/// A direct message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: String,
    #[serde(default)]
    pub from: Option<Participant>,
    #[serde(default)]
    pub to: Participants,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "graph_timestamp")]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Value>,
}

/// Input for publishing a single image or video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishMediaRequest {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
}

/// Outcome of a publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishMediaResponse {
    /// Id of the published media object.
    pub id: String,
    /// Id of the intermediate media container.
    pub container_id: String,
    pub status: &'static str,
}

/// Input for sending a direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    /// Instagram-scoped id of the recipient.
    pub recipient_id: String,
    pub message: String,
}

/// Outcome of sending a direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendMessageResponse {
    pub message_id: String,
    pub recipient_id: String,
}

/// Result of validating the access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenStatus {
    pub valid: bool,
    /// Id of the token's user when valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Upstream rejection message when invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Rate limiter usage plus cache occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientStatus {
    pub rate_limits: RateLimitStatus,
    pub cached_responses: usize,
    /// Facebook app id the token was issued for, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

/// Graph list envelope: `{"data": [...], "paging": {...}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Paging {
    #[serde(default)]
    pub cursors: Option<Cursors>,
    /// Only present when another page exists.
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Cursors {
    #[serde(default)]
    pub after: Option<String>,
}

impl<T> ListEnvelope<T> {
    /// Cursor for the next page, if there is one.
    pub fn next_cursor(&self) -> Option<String> {
        let paging = self.paging.as_ref()?;
        paging.next.as_ref()?;
        paging.cursors.as_ref()?.after.clone()
    }
}

/// Response body of a create call: `{"id": "..."}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Created {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn media_parses_graph_timestamp() {
        let media: InstagramMedia = serde_json::from_value(json!({
            "id": "17895695668004550",
            "media_type": "IMAGE",
            "caption": "Sunset #beach #golden_hour",
            "timestamp": "2024-01-01T12:00:00+0000",
            "like_count": 50
        }))
        .unwrap();

        assert_eq!(media.media_type, MediaType::Image);
        assert_eq!(
            media.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(media.hashtags(), vec!["#beach", "#golden_hour"]);
    }

    #[test]
    fn media_accepts_rfc3339_and_unknown_type() {
        let media: InstagramMedia = serde_json::from_value(json!({
            "id": "1",
            "media_type": "REELS",
            "timestamp": "2024-01-02T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(media.media_type, MediaType::Unknown);
        assert!(media.timestamp.is_some());
        assert!(media.hashtags().is_empty());
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let result: Result<InstagramMedia, _> =
            serde_json::from_value(json!({"id": "1", "timestamp": "yesterday"}));
        assert!(result.is_err());
    }

    #[test]
    fn list_envelope_cursor_requires_next() {
        let last: ListEnvelope<InstagramMedia> = serde_json::from_value(json!({
            "data": [],
            "paging": {"cursors": {"before": "a", "after": "b"}}
        }))
        .unwrap();
        assert_eq!(last.next_cursor(), None);

        let more: ListEnvelope<InstagramMedia> = serde_json::from_value(json!({
            "data": [],
            "paging": {"cursors": {"after": "b"}, "next": "https://graph.facebook.com/..."}
        }))
        .unwrap();
        assert_eq!(more.next_cursor(), Some("b".to_string()));
    }

    #[test]
    fn metric_names_match_serde() {
        for metric in InsightMetric::DEFAULT_MEDIA {
            assert_eq!(json!(metric), json!(metric.as_str()));
        }
        assert_eq!(json!(InsightPeriod::Days28), json!("days_28"));
    }

    #[test]
    fn direct_message_parses_recipients() {
        let message: DirectMessage = serde_json::from_value(json!({
            "id": "m_1",
            "from": {"id": "42", "username": "alice"},
            "to": {"data": [{"id": "7", "username": "shop"}]},
            "message": "Hi!",
            "created_time": "2024-03-01T09:30:00+0000"
        }))
        .unwrap();
        assert_eq!(message.to.data.len(), 1);
        assert_eq!(message.from.unwrap().username.as_deref(), Some("alice"));
    }
}
