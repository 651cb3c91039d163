//! MCP tools backed by the Graph client.
//!
//! Every tool returns pretty-printed JSON text. Successful calls produce
//! `{success, data, metadata}`; failed calls produce an `isError` result
//! carrying the error kind, the platform's code and subcode when present,
//! and a hint for failures the user can act on.

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::graph::{
    GraphClient, GraphError, InsightMetric, InsightPeriod, PublishMediaRequest,
    SendMessageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
use crate::mcp::server::{ToolCallResult, ToolDefinition};

const ADVANCED_ACCESS_HINT: &str = "Direct messaging requires Advanced Access for the \
    instagram_manage_messages permission. Submit the app for App Review, request Advanced \
    Access, and retry once it is approved.";

const MESSAGING_WINDOW_HINT: &str = "Instagram only accepts replies within 24 hours of the \
    user's last message. Wait for the user to message the account again.";

const AUTHENTICATION_HINT: &str = "The access token is invalid or expired. Generate a new \
    long-lived token and update INSTAGRAM_ACCESS_TOKEN.";

const PERMISSION_HINT: &str = "The access token lacks a required permission, such as \
    instagram_basic, instagram_content_publish, instagram_manage_insights or pages_show_list.";

const NETWORK_HINT: &str = "The Graph API could not be reached. Check network connectivity \
    and retry.";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AccountArgs {
    #[serde(default)]
    account_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MediaPostsArgs {
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MediaArgs {
    media_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MediaInsightsArgs {
    media_id: String,
    #[serde(default)]
    metrics: Vec<InsightMetric>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AccountInsightsArgs {
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    metrics: Vec<String>,
    #[serde(default)]
    period: InsightPeriod,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConversationsArgs {
    #[serde(default)]
    page_id: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConversationMessagesArgs {
    conversation_id: String,
    #[serde(default)]
    limit: Option<u32>,
}

/// Why a tool call failed before or during execution.
enum Failure {
    Arguments(String),
    Graph(GraphError),
}

impl From<GraphError> for Failure {
    fn from(error: GraphError) -> Self {
        Self::Graph(error)
    }
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, Failure> {
    let arguments = if arguments.is_null() {
        Value::Object(Map::new())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| Failure::Arguments(e.to_string()))
}

fn to_data<T: Serialize>(value: &T) -> Result<Value, Failure> {
    serde_json::to_value(value).map_err(|e| Failure::Arguments(format!("unserialisable result: {e}")))
}

fn metadata(tool: &str) -> Value {
    json!({
        "tool": tool,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

fn render(body: &Value, is_error: bool) -> ToolCallResult {
    let text = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
    if is_error {
        ToolCallResult::error(text)
    } else {
        ToolCallResult::text(text)
    }
}

/// Hint for errors the user can resolve.
#[must_use]
pub fn hint(error: &GraphError) -> Option<&'static str> {
    if error.detail().is_some_and(|d| d.is_messaging_window()) {
        return Some(MESSAGING_WINDOW_HINT);
    }
    match error {
        GraphError::Permission { .. } if error.requires_advanced_access() => {
            Some(ADVANCED_ACCESS_HINT)
        }
        GraphError::Permission { .. } => Some(PERMISSION_HINT),
        GraphError::Authentication { .. } => Some(AUTHENTICATION_HINT),
        GraphError::Network { .. } => Some(NETWORK_HINT),
        _ => None,
    }
}

fn failure_body(tool: &str, failure: &Failure) -> Value {
    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(false));

    match failure {
        Failure::Arguments(message) => {
            body.insert("error".into(), json!(format!("invalid arguments: {message}")));
            body.insert("error_kind".into(), json!("validation"));
        }
        Failure::Graph(error) => {
            body.insert("error".into(), json!(error.to_string()));
            body.insert("error_kind".into(), json!(error.kind()));
            if let Some(detail) = error.detail() {
                if let Some(code) = detail.code {
                    body.insert("error_code".into(), json!(code));
                }
                if let Some(subcode) = detail.error_subcode {
                    body.insert("error_subcode".into(), json!(subcode));
                }
                if let Some(trace) = &detail.fbtrace_id {
                    body.insert("fbtrace_id".into(), json!(trace));
                }
            }
            if let GraphError::RateLimited {
                retry_after: Some(wait),
                ..
            } = error
            {
                body.insert("retry_after_seconds".into(), json!(wait.as_secs()));
            }
            if let Some(hint) = hint(error) {
                body.insert("hint".into(), json!(hint));
            }
        }
    }

    body.insert("metadata".into(), metadata(tool));
    Value::Object(body)
}

/// Runs the named tool.
///
/// Unknown tools and failures are reported as `isError` results, never as
/// protocol errors.
pub async fn call(client: &GraphClient, name: &str, arguments: Value) -> ToolCallResult {
    let outcome = match name {
        "get_profile_info" => get_profile_info(client, arguments).await,
        "get_media_posts" => get_media_posts(client, arguments).await,
        "get_media" => get_media(client, arguments).await,
        "get_media_insights" => get_media_insights(client, arguments).await,
        "publish_media" => publish_media(client, arguments).await,
        "get_account_pages" => get_account_pages(client, arguments).await,
        "get_account_insights" => get_account_insights(client, arguments).await,
        "validate_access_token" => validate_access_token(client, arguments).await,
        "get_conversations" => get_conversations(client, arguments).await,
        "get_conversation_messages" => get_conversation_messages(client, arguments).await,
        "send_dm" => send_dm(client, arguments).await,
        "get_rate_limit_status" => get_rate_limit_status(client, arguments),
        _ => return ToolCallResult::error(format!("Unknown tool: {name}")),
    };

    match outcome {
        Ok(data) => {
            tracing::debug!(tool = name, "Tool call succeeded");
            render(
                &json!({
                    "success": true,
                    "data": data,
                    "metadata": metadata(name),
                }),
                false,
            )
        }
        Err(failure) => {
            match &failure {
                Failure::Arguments(message) => {
                    tracing::warn!(tool = name, error = %message, "Invalid tool arguments");
                }
                Failure::Graph(error) => {
                    tracing::error!(tool = name, kind = error.kind(), error = %error, "Tool call failed");
                }
            }
            render(&failure_body(name, &failure), true)
        }
    }
}

async fn get_profile_info(client: &GraphClient, arguments: Value) -> Result<Value, Failure> {
    let args: AccountArgs = parse_args(arguments)?;
    let profile = client.get_profile(args.account_id.as_deref()).await?;
    to_data(&profile)
}

async fn get_media_posts(client: &GraphClient, arguments: Value) -> Result<Value, Failure> {
    let args: MediaPostsArgs = parse_args(arguments)?;
    let page = client
        .get_media_posts(
            args.account_id.as_deref(),
            args.limit.unwrap_or(DEFAULT_PAGE_SIZE),
            args.after.as_deref(),
        )
        .await?;
    Ok(json!({
        "count": page.media.len(),
        "posts": to_data(&page.media)?,
        "after": page.after,
    }))
}

async fn get_media(client: &GraphClient, arguments: Value) -> Result<Value, Failure> {
    let args: MediaArgs = parse_args(arguments)?;
    let media = client.get_media(&args.media_id).await?;
    to_data(&media)
}

async fn get_media_insights(client: &GraphClient, arguments: Value) -> Result<Value, Failure> {
    let args: MediaInsightsArgs = parse_args(arguments)?;
    let insights = client.get_media_insights(&args.media_id, &args.metrics).await?;
    Ok(json!({
        "media_id": args.media_id,
        "insights": to_data(&insights)?,
    }))
}

async fn publish_media(client: &GraphClient, arguments: Value) -> Result<Value, Failure> {
    let request: PublishMediaRequest = parse_args(arguments)?;
    let response = client.publish_media(&request).await?;
    to_data(&response)
}

async fn get_account_pages(client: &GraphClient, arguments: Value) -> Result<Value, Failure> {
    let NoArgs {} = parse_args(arguments)?;
    let pages = client.get_account_pages().await?;
    Ok(json!({
        "count": pages.len(),
        "pages": to_data(&pages)?,
    }))
}

async fn get_account_insights(client: &GraphClient, arguments: Value) -> Result<Value, Failure> {
    let args: AccountInsightsArgs = parse_args(arguments)?;
    let insights = client
        .get_account_insights(args.account_id.as_deref(), &args.metrics, args.period)
        .await?;
    Ok(json!({
        "period": args.period.as_str(),
        "insights": to_data(&insights)?,
    }))
}

async fn validate_access_token(client: &GraphClient, arguments: Value) -> Result<Value, Failure> {
    let NoArgs {} = parse_args(arguments)?;
    let status = client.validate_access_token().await?;
    to_data(&status)
}

async fn get_conversations(client: &GraphClient, arguments: Value) -> Result<Value, Failure> {
    let args: ConversationsArgs = parse_args(arguments)?;
    let conversations = client
        .get_conversations(
            args.page_id.as_deref(),
            args.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(json!({
        "count": conversations.len(),
        "conversations": to_data(&conversations)?,
    }))
}

async fn get_conversation_messages(
    client: &GraphClient,
    arguments: Value,
) -> Result<Value, Failure> {
    let args: ConversationMessagesArgs = parse_args(arguments)?;
    let messages = client
        .get_conversation_messages(
            &args.conversation_id,
            args.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(json!({
        "conversation_id": args.conversation_id,
        "count": messages.len(),
        "messages": to_data(&messages)?,
    }))
}

async fn send_dm(client: &GraphClient, arguments: Value) -> Result<Value, Failure> {
    let request: SendMessageRequest = parse_args(arguments)?;
    let response = client.send_message(&request).await?;
    to_data(&response)
}

fn get_rate_limit_status(client: &GraphClient, arguments: Value) -> Result<Value, Failure> {
    let NoArgs {} = parse_args(arguments)?;
    to_data(&client.rate_limit_status())
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {}, "additionalProperties": false })
}

/// Definitions for `tools/list`.
#[allow(clippy::too_many_lines)]
#[must_use]
pub fn definitions() -> Vec<ToolDefinition> {
    let account_id = json!({
        "type": "string",
        "description": "Instagram business account ID (optional, uses the configured account if not provided)"
    });
    let limit = json!({
        "type": "integer",
        "minimum": 1,
        "maximum": MAX_PAGE_SIZE,
        "default": DEFAULT_PAGE_SIZE
    });

    vec![
        // === Account ===
        tool(
            "get_profile_info",
            "Get Instagram business profile information including followers, bio, and account details.",
            json!({
                "type": "object",
                "properties": { "account_id": account_id },
                "additionalProperties": false
            }),
        ),
        tool(
            "get_account_pages",
            "Get Facebook pages connected to the account and their linked Instagram business accounts.",
            empty_schema(),
        ),
        tool(
            "get_account_insights",
            "Get account-level insights (reach, profile views, website clicks by default) totalled over a period.",
            json!({
                "type": "object",
                "properties": {
                    "account_id": account_id,
                    "metrics": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Metric names, e.g. reach, profile_views, website_clicks, follower_count, accounts_engaged"
                    },
                    "period": {
                        "type": "string",
                        "enum": ["day", "week", "days_28", "lifetime"],
                        "default": "day"
                    }
                },
                "additionalProperties": false
            }),
        ),
        tool(
            "validate_access_token",
            "Check whether the configured access token is accepted by the Graph API.",
            empty_schema(),
        ),
        // === Media ===
        tool(
            "get_media_posts",
            "Get recent media posts, newest first, with engagement counts. Use the returned 'after' cursor to page.",
            json!({
                "type": "object",
                "properties": {
                    "account_id": account_id,
                    "limit": limit,
                    "after": {
                        "type": "string",
                        "description": "Pagination cursor from a previous call"
                    }
                },
                "additionalProperties": false
            }),
        ),
        tool(
            "get_media",
            "Get a single media post by ID.",
            json!({
                "type": "object",
                "properties": {
                    "media_id": { "type": "string", "description": "Instagram media ID" }
                },
                "required": ["media_id"],
                "additionalProperties": false
            }),
        ),
        tool(
            "get_media_insights",
            "Get insights for a specific post. Defaults to reach, likes, comments, shares and saved. \
             video_views only applies to video posts.",
            json!({
                "type": "object",
                "properties": {
                    "media_id": { "type": "string", "description": "Instagram media ID" },
                    "metrics": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": [
                                "impressions", "reach", "likes", "comments", "shares",
                                "saved", "video_views", "profile_visits", "website_clicks"
                            ]
                        }
                    }
                },
                "required": ["media_id"],
                "additionalProperties": false
            }),
        ),
        tool(
            "publish_media",
            "Publish an image or video (as a reel) from a publicly accessible URL. \
             Provide exactly one of image_url or video_url. Images must be 4:5, 1:1 or 1.91:1. \
             Captions are limited to 2200 characters.",
            json!({
                "type": "object",
                "properties": {
                    "image_url": { "type": "string", "format": "uri" },
                    "video_url": { "type": "string", "format": "uri" },
                    "caption": { "type": "string", "maxLength": crate::graph::config::MAX_CAPTION_LENGTH },
                    "location_id": {
                        "type": "string",
                        "description": "Facebook location ID for geotagging"
                    }
                },
                "oneOf": [
                    { "required": ["image_url"] },
                    { "required": ["video_url"] }
                ],
                "additionalProperties": false
            }),
        ),
        // === Messaging (Advanced Access) ===
        tool(
            "get_conversations",
            "List Instagram direct-message conversations of a connected page. \
             Requires Advanced Access for instagram_manage_messages.",
            json!({
                "type": "object",
                "properties": {
                    "page_id": {
                        "type": "string",
                        "description": "Facebook page ID (optional, uses the first connected page)"
                    },
                    "limit": limit
                },
                "additionalProperties": false
            }),
        ),
        tool(
            "get_conversation_messages",
            "List messages in a direct-message conversation. Requires Advanced Access.",
            json!({
                "type": "object",
                "properties": {
                    "conversation_id": { "type": "string" },
                    "limit": limit
                },
                "required": ["conversation_id"],
                "additionalProperties": false
            }),
        ),
        tool(
            "send_dm",
            "Reply to a user by direct message. Only possible within 24 hours of the user's last \
             message. Requires Advanced Access.",
            json!({
                "type": "object",
                "properties": {
                    "recipient_id": {
                        "type": "string",
                        "description": "Instagram-scoped ID of the recipient"
                    },
                    "message": { "type": "string" }
                },
                "required": ["recipient_id", "message"],
                "additionalProperties": false
            }),
        ),
        // === Diagnostics ===
        tool(
            "get_rate_limit_status",
            "Show usage of the hourly request and daily publishing quotas, and cache occupancy.",
            empty_schema(),
        ),
    ]
}
