//! Read-only MCP resources.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::graph::{GraphClient, GraphError, InsightPeriod};

/// Number of posts in `instagram://media/recent`.
pub const RECENT_MEDIA_COUNT: u32 = 10;

const JSON_MIME_TYPE: &str = "application/json";

/// A resource entry for `resources/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

/// One item of a `resources/read` result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: &'static str,
    pub text: String,
}

/// Failure to read a resource.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("unknown resource URI: {0}")]
    UnknownUri(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("failed to serialise resource: {0}")]
    Serialise(#[from] serde_json::Error),
}

/// Definitions for `resources/list`.
#[must_use]
pub fn definitions() -> Vec<ResourceDefinition> {
    vec![
        ResourceDefinition {
            uri: "instagram://profile",
            name: "Instagram Profile",
            description: "Current Instagram business profile information",
            mime_type: JSON_MIME_TYPE,
        },
        ResourceDefinition {
            uri: "instagram://media/recent",
            name: "Recent Media Posts",
            description: "The 10 most recent posts with engagement counts",
            mime_type: JSON_MIME_TYPE,
        },
        ResourceDefinition {
            uri: "instagram://insights/account",
            name: "Account Insights",
            description: "Daily account-level reach, profile views and website clicks",
            mime_type: JSON_MIME_TYPE,
        },
        ResourceDefinition {
            uri: "instagram://pages",
            name: "Connected Pages",
            description: "Facebook pages connected to the account",
            mime_type: JSON_MIME_TYPE,
        },
    ]
}

/// Reads the resource at `uri`.
///
/// # Errors
///
/// Returns [`ResourceError::UnknownUri`] for URIs not in [`definitions`] and
/// [`ResourceError::Graph`] if the underlying call fails.
pub async fn read(client: &GraphClient, uri: &str) -> Result<ResourceContents, ResourceError> {
    let value: Value = match uri {
        "instagram://profile" => serde_json::to_value(client.get_profile(None).await?)?,
        "instagram://media/recent" => {
            let page = client.get_media_posts(None, RECENT_MEDIA_COUNT, None).await?;
            serde_json::to_value(page.media)?
        }
        "instagram://insights/account" => serde_json::to_value(
            client
                .get_account_insights(None, &[], InsightPeriod::Day)
                .await?,
        )?,
        "instagram://pages" => serde_json::to_value(client.get_account_pages().await?)?,
        _ => return Err(ResourceError::UnknownUri(uri.to_string())),
    };

    Ok(ResourceContents {
        uri: uri.to_string(),
        mime_type: JSON_MIME_TYPE,
        text: serde_json::to_string_pretty(&value)?,
    })
}
