//! MCP prompt templates filled with live account data.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::graph::{GraphClient, GraphError, InsightPeriod, InstagramMedia, MAX_PAGE_SIZE};

const DEFAULT_HASHTAG_POST_COUNT: u32 = 10;
const STRATEGY_POST_COUNT: u32 = 20;
const STRATEGY_SAMPLE_SIZE: usize = 5;

/// An argument accepted by a prompt.
#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// A prompt entry for `prompts/list`.
#[derive(Debug, Clone, Serialize)]
pub struct PromptDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgument>,
}

/// Content of a prompt message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PromptContent {
    Text { text: String },
}

/// A message of a rendered prompt.
#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: PromptContent,
}

/// Result of `prompts/get`.
#[derive(Debug, Clone, Serialize)]
pub struct PromptResult {
    pub description: String,
    pub messages: Vec<PromptMessage>,
}

impl PromptResult {
    fn user(description: impl Into<String>, text: String) -> Self {
        Self {
            description: description.into(),
            messages: vec![PromptMessage {
                role: "user",
                content: PromptContent::Text { text },
            }],
        }
    }
}

/// Failure to render a prompt.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("unknown prompt: {0}")]
    UnknownPrompt(String),

    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid argument '{name}': {message}")]
    InvalidArgument { name: &'static str, message: String },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("failed to serialise prompt data: {0}")]
    Serialise(#[from] serde_json::Error),
}

/// Usage and engagement of one hashtag across a set of posts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HashtagStats {
    /// Lowercased tag including the leading `#`.
    pub tag: String,
    /// Posts using the tag.
    pub posts: u32,
    pub total_likes: u64,
    pub total_comments: u64,
}

/// Aggregates hashtag usage, most used first.
///
/// Tags are compared case-insensitively and counted once per post. Ties keep
/// first-seen order.
#[must_use]
pub fn hashtag_stats(media: &[InstagramMedia]) -> Vec<HashtagStats> {
    let mut stats: IndexMap<String, HashtagStats> = IndexMap::new();

    for post in media {
        let tags: IndexSet<String> = post.hashtags().iter().map(|t| t.to_lowercase()).collect();
        for tag in tags {
            let entry = stats.entry(tag.clone()).or_insert_with(|| HashtagStats {
                tag,
                ..HashtagStats::default()
            });
            entry.posts += 1;
            entry.total_likes += post.like_count.unwrap_or(0);
            entry.total_comments += post.comments_count.unwrap_or(0);
        }
    }

    let mut ranked: Vec<HashtagStats> = stats.into_values().collect();
    ranked.sort_by(|a, b| b.posts.cmp(&a.posts));
    ranked
}

/// Definitions for `prompts/list`.
#[must_use]
pub fn definitions() -> Vec<PromptDefinition> {
    vec![
        PromptDefinition {
            name: "analyze_engagement",
            description: "Analyze Instagram post engagement and provide insights",
            arguments: vec![
                PromptArgument {
                    name: "media_id",
                    description: "Instagram media ID to analyze",
                    required: true,
                },
                PromptArgument {
                    name: "comparison_period",
                    description: "Period to compare against (e.g., 'last_week', 'last_month')",
                    required: false,
                },
            ],
        },
        PromptDefinition {
            name: "content_strategy",
            description: "Generate content strategy recommendations based on account performance",
            arguments: vec![
                PromptArgument {
                    name: "focus_area",
                    description: "Area to focus on (e.g., 'engagement', 'reach', 'growth')",
                    required: false,
                },
                PromptArgument {
                    name: "time_period",
                    description: "Time period to plan for (e.g., 'week', 'month')",
                    required: false,
                },
            ],
        },
        PromptDefinition {
            name: "hashtag_analysis",
            description: "Analyze hashtag performance and suggest improvements",
            arguments: vec![PromptArgument {
                name: "post_count",
                description: "Number of recent posts to analyze (default 10, max 100)",
                required: false,
            }],
        },
    ]
}

fn argument<'a>(arguments: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    arguments
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Renders the named prompt.
///
/// # Errors
///
/// Returns [`PromptError`] for unknown prompts, bad arguments, or failed
/// Graph calls.
pub async fn get(
    client: &GraphClient,
    name: &str,
    arguments: &HashMap<String, String>,
) -> Result<PromptResult, PromptError> {
    match name {
        "analyze_engagement" => analyze_engagement(client, arguments).await,
        "content_strategy" => content_strategy(client, arguments).await,
        "hashtag_analysis" => hashtag_analysis(client, arguments).await,
        _ => Err(PromptError::UnknownPrompt(name.to_string())),
    }
}

async fn analyze_engagement(
    client: &GraphClient,
    arguments: &HashMap<String, String>,
) -> Result<PromptResult, PromptError> {
    let media_id =
        argument(arguments, "media_id").ok_or(PromptError::MissingArgument("media_id"))?;
    let insights = client.get_media_insights(media_id, &[]).await?;

    let comparison = argument(arguments, "comparison_period")
        .map(|period| format!("\n6. How this post compares with posts from {period}"))
        .unwrap_or_default();

    let text = format!(
        "Analyze the engagement metrics for Instagram post {media_id}:\n\n\
         Insights Data:\n{}\n\n\
         Please provide:\n\
         1. Overall engagement performance assessment\n\
         2. Key metrics analysis (reach, likes, comments, shares, saves)\n\
         3. Engagement rate calculation and interpretation\n\
         4. Recommendations for improving future posts\n\
         5. Comparison with typical performance benchmarks{comparison}\n",
        serde_json::to_string_pretty(&insights)?
    );

    Ok(PromptResult::user(
        format!("Engagement analysis for post {media_id}"),
        text,
    ))
}

async fn content_strategy(
    client: &GraphClient,
    arguments: &HashMap<String, String>,
) -> Result<PromptResult, PromptError> {
    let focus_area = argument(arguments, "focus_area").unwrap_or("engagement");
    let time_period = argument(arguments, "time_period").unwrap_or("week");

    let page = client.get_media_posts(None, STRATEGY_POST_COUNT, None).await?;
    let insights = client
        .get_account_insights(None, &[], InsightPeriod::Day)
        .await?;
    let sample = &page.media[..page.media.len().min(STRATEGY_SAMPLE_SIZE)];

    let text = format!(
        "Generate a content strategy for Instagram focusing on {focus_area} over the next {time_period}:\n\n\
         Recent Posts Performance:\n{}\n\n\
         Account Insights:\n{}\n\n\
         Please provide:\n\
         1. Content performance analysis\n\
         2. Optimal posting times and frequency\n\
         3. Content type recommendations (images, videos, carousels)\n\
         4. Caption and hashtag strategies\n\
         5. Engagement tactics to improve {focus_area}\n\
         6. Specific action items for the next {time_period}\n",
        serde_json::to_string_pretty(sample)?,
        serde_json::to_string_pretty(&insights)?
    );

    Ok(PromptResult::user(
        format!("Content strategy focused on {focus_area}"),
        text,
    ))
}

async fn hashtag_analysis(
    client: &GraphClient,
    arguments: &HashMap<String, String>,
) -> Result<PromptResult, PromptError> {
    let post_count = match argument(arguments, "post_count") {
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|n| (1..=MAX_PAGE_SIZE).contains(n))
            .ok_or_else(|| PromptError::InvalidArgument {
                name: "post_count",
                message: format!("expected an integer between 1 and {MAX_PAGE_SIZE}, got '{raw}'"),
            })?,
        None => DEFAULT_HASHTAG_POST_COUNT,
    };

    let page = client.get_media_posts(None, post_count, None).await?;
    let per_post: Vec<_> = page
        .media
        .iter()
        .filter(|post| post.caption.is_some())
        .map(|post| {
            json!({
                "post_id": post.id,
                "hashtags": post.hashtags(),
                "likes": post.like_count,
                "comments": post.comments_count,
            })
        })
        .collect();

    let text = format!(
        "Analyze hashtag performance for the last {} Instagram posts:\n\n\
         Hashtag Usage (most used first):\n{}\n\n\
         Per-Post Data:\n{}\n\n\
         Please provide:\n\
         1. Most frequently used hashtags\n\
         2. Hashtag performance correlation with engagement\n\
         3. Hashtag diversity analysis\n\
         4. Recommendations for hashtag optimization\n\
         5. Suggested new hashtags to try\n\
         6. Hashtag strategy improvements\n",
        page.media.len(),
        serde_json::to_string_pretty(&hashtag_stats(&page.media))?,
        serde_json::to_string_pretty(&per_post)?
    );

    Ok(PromptResult::user(
        format!("Hashtag analysis of {} posts", page.media.len()),
        text,
    ))
}
