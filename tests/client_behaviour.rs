//! Integration tests for the Graph client pipeline.
//!
//! These run against a scripted transport with tokio's clock paused, so
//! cache expiry, rolling windows and backoff sleeps advance instantly.

mod common;

use std::time::Duration;

use serde_json::json;

use common::{client, client_with, config, media, ACCOUNT_ID};
use instagram_mcp::graph::{
    AccessTier, BackoffPolicy, GraphError, Method, PublishMediaRequest, Quota, RequestBody,
    SendMessageRequest, TransportErrorKind,
};

fn no_backoff() -> BackoffPolicy {
    BackoffPolicy {
        enabled: false,
        ..BackoffPolicy::default()
    }
}

// =============================================================================
// Cache
// =============================================================================

#[tokio::test(start_paused = true)]
async fn cache_hit_makes_no_network_call() {
    let (client, transport) = client();
    transport.ok(media("1001", "First post #hello"));

    let first = client.get_media("1001").await.unwrap();
    let second = client.get_media("1001").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(transport.calls(), 1);
    assert_eq!(client.rate_limit_status().rate_limits.requests.used, 1);
}

#[tokio::test(start_paused = true)]
async fn cache_entry_expires_after_ttl() {
    let (client, transport) = client();
    transport.ok(media("1001", "before"));
    transport.ok(media("1001", "after"));

    client.get_media("1001").await.unwrap();
    tokio::time::advance(Duration::from_secs(299)).await;
    assert_eq!(
        client.get_media("1001").await.unwrap().caption.as_deref(),
        Some("before")
    );

    tokio::time::advance(Duration::from_secs(2)).await;
    let refreshed = client.get_media("1001").await.unwrap();
    assert_eq!(refreshed.caption.as_deref(), Some("after"));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn disabled_cache_always_fetches() {
    let mut config = config();
    config.cache.enabled = false;
    let (client, transport) = client_with(config);
    transport.ok(media("1001", "a"));
    transport.ok(media("1001", "b"));

    client.get_media("1001").await.unwrap();
    client.get_media("1001").await.unwrap();

    assert_eq!(transport.calls(), 2);
    assert_eq!(client.rate_limit_status().cached_responses, 0);
}

#[tokio::test(start_paused = true)]
async fn token_validation_bypasses_cache() {
    let (client, transport) = client();
    transport.ok(json!({"id": "42"}));
    transport.ok(json!({"id": "42"}));

    assert!(client.validate_access_token().await.unwrap().valid);
    assert!(client.validate_access_token().await.unwrap().valid);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn errors_are_not_cached() {
    let (client, transport) = client();
    transport.graph_error(400, 100, "Unsupported get request");
    transport.ok(media("1001", "recovered"));

    let err = client.get_media("1001").await.unwrap_err();
    assert!(matches!(err, GraphError::Validation { .. }));
    assert!(client.get_media("1001").await.is_ok());
    assert_eq!(transport.calls(), 2);
}

// =============================================================================
// Rate limiting and retries
// =============================================================================

#[tokio::test(start_paused = true)]
async fn hourly_ceiling_rejects_without_network_call() {
    let mut config = config();
    config.limits.requests_per_hour = 2;
    config.backoff = no_backoff();
    let (client, transport) = client_with(config);
    transport.ok(media("1", "a"));
    transport.ok(media("2", "b"));

    client.get_media("1").await.unwrap();
    client.get_media("2").await.unwrap();
    let err = client.get_media("3").await.unwrap_err();

    match err {
        GraphError::RateLimited {
            quota, retry_after, ..
        } => {
            assert_eq!(quota, Quota::Requests);
            assert!(retry_after.is_some());
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert_eq!(transport.calls(), 2);

    // Cached reads still succeed while the quota is exhausted.
    assert!(client.get_media("1").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn hourly_window_frees_slots() {
    let mut config = config();
    config.limits.requests_per_hour = 1;
    config.backoff = no_backoff();
    let (client, transport) = client_with(config);
    transport.ok(media("1", "a"));
    transport.ok(media("2", "b"));

    client.get_media("1").await.unwrap();
    assert!(client.get_media("2").await.is_err());

    tokio::time::advance(Duration::from_secs(60 * 60)).await;
    assert!(client.get_media("2").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn transport_failures_retry_then_fail() {
    let (client, transport) = client();
    for _ in 0..4 {
        transport.fail(TransportErrorKind::Timeout);
    }

    let err = client.get_media("1001").await.unwrap_err();

    match err {
        GraphError::Network { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected Network, got {other:?}"),
    }
    assert_eq!(transport.calls(), 4);
    // Every attempt counts against the hourly quota.
    assert_eq!(client.rate_limit_status().rate_limits.requests.used, 4);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_recovers() {
    let (client, transport) = client();
    transport.fail(TransportErrorKind::Connect);
    transport.ok(media("1001", "ok"));

    assert!(client.get_media("1001").await.is_ok());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn timed_out_posts_are_not_replayed() {
    let (client, transport) = client();
    transport.ok(json!({"id": "container-1"}));
    transport.fail(TransportErrorKind::Timeout);
    transport.fail(TransportErrorKind::Timeout);
    transport.ok(json!({"recipient_id": "9001", "message_id": "m_1"}));

    let err = client
        .publish_media(&PublishMediaRequest {
            video_url: Some("https://cdn.example.com/reel.mp4".to_string()),
            ..PublishMediaRequest::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Network { attempts: 1, .. }));

    let err = client
        .send_message(&SendMessageRequest {
            recipient_id: "9001".to_string(),
            message: "hello".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Network { attempts: 1, .. }));

    let posts_to = |suffix: &str| {
        (0..transport.calls())
            .filter(|&i| transport.request(i).url.ends_with(suffix))
            .count()
    };
    assert_eq!(posts_to("/media_publish"), 1);
    assert_eq!(posts_to("/me/messages"), 1);
    assert_eq!(transport.calls(), 3);
    assert_eq!(client.rate_limit_status().rate_limits.publishing.used, 0);
}

#[tokio::test(start_paused = true)]
async fn refused_post_connection_is_retried() {
    let (client, transport) = client();
    transport.fail(TransportErrorKind::Connect);
    transport.ok(json!({"recipient_id": "9001", "message_id": "m_2"}));

    let sent = client
        .send_message(&SendMessageRequest {
            recipient_id: "9001".to_string(),
            message: "hello".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(sent.message_id, "m_2");
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn platform_throttling_is_retried() {
    let (client, transport) = client();
    transport.graph_error(429, 4, "Application request limit reached");
    transport.ok(media("1001", "ok"));

    assert!(client.get_media("1001").await.is_ok());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn platform_throttling_without_backoff_fails_fast() {
    let mut config = config();
    config.backoff = no_backoff();
    let (client, transport) = client_with(config);
    transport.graph_error(400, 17, "User request limit reached");

    let err = client.get_media("1001").await.unwrap_err();
    match err {
        GraphError::RateLimited {
            quota,
            attempts,
            detail,
            ..
        } => {
            assert_eq!(quota, Quota::Upstream);
            assert_eq!(attempts, 1);
            assert_eq!(detail.unwrap().code, Some(17));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn error_object_in_success_body_is_an_error() {
    let (client, transport) = client();
    transport.ok(json!({"error": {"message": "Invalid OAuth access token", "code": 190}}));

    let status = client.validate_access_token().await.unwrap();
    assert!(!status.valid);
    assert_eq!(status.reason.as_deref(), Some("Invalid OAuth access token"));
}

// =============================================================================
// Operations
// =============================================================================

#[tokio::test(start_paused = true)]
async fn requests_carry_bearer_token_and_version() {
    let (client, transport) = client();
    transport.ok(json!({"id": ACCOUNT_ID, "username": "coffee.shop", "followers_count": 1200}));

    let profile = client.get_profile(None).await.unwrap();
    assert_eq!(profile.username, "coffee.shop");

    let request = transport.request(0);
    assert_eq!(request.method, Method::Get);
    assert_eq!(
        request.url,
        format!("https://graph.facebook.com/v19.0/{ACCOUNT_ID}")
    );
    assert!(transport.query(0, "access_token").is_none());
    assert!(transport.query(0, "fields").unwrap().contains("followers_count"));
}

#[tokio::test(start_paused = true)]
async fn media_posts_expose_next_cursor() {
    let (client, transport) = client();
    transport.ok(json!({
        "data": [media("1", "a"), media("2", "b")],
        "paging": {
            "cursors": {"before": "B", "after": "QVFI"},
            "next": "https://graph.facebook.com/next"
        }
    }));

    let page = client.get_media_posts(None, 500, None).await.unwrap();
    assert_eq!(page.media.len(), 2);
    assert_eq!(page.after.as_deref(), Some("QVFI"));
    assert_eq!(transport.query(0, "limit").as_deref(), Some("100"));
}

#[tokio::test(start_paused = true)]
async fn publish_then_read_back() {
    let (client, transport) = client();
    transport.image(1080, 1350);
    transport.ok(json!({"id": "container-1"}));
    transport.ok(json!({"id": "1790000000001"}));
    transport.ok(media("1790000000001", "Fresh roast #coffee"));

    let published = client
        .publish_media(&PublishMediaRequest {
            image_url: Some("https://cdn.example.com/roast.jpg".to_string()),
            caption: Some("Fresh roast #coffee".to_string()),
            ..PublishMediaRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(published.id, "1790000000001");
    assert_eq!(published.container_id, "container-1");

    let download = transport.request(0);
    assert_eq!(download.method, Method::Get);
    assert_eq!(download.url, "https://cdn.example.com/roast.jpg");
    assert!(download.bearer_token.is_none());

    let container = transport.request(1);
    assert_eq!(container.method, Method::Post);
    assert!(container.url.ends_with(&format!("{ACCOUNT_ID}/media")));
    let Some(RequestBody::Form(fields)) = container.body else {
        panic!("expected form body");
    };
    assert_eq!(fields["image_url"], "https://cdn.example.com/roast.jpg");

    let publish = transport.request(2);
    assert!(publish.url.ends_with("/media_publish"));
    let Some(RequestBody::Form(fields)) = publish.body else {
        panic!("expected form body");
    };
    assert_eq!(fields["creation_id"], "container-1");

    let fetched = client.get_media(&published.id).await.unwrap();
    assert_eq!(fetched.caption.as_deref(), Some("Fresh roast #coffee"));
    assert_eq!(fetched.hashtags(), vec!["#coffee"]);

    // The image download is not a Graph API call.
    let status = client.rate_limit_status().rate_limits;
    assert_eq!(status.publishing.used, 1);
    assert_eq!(status.requests.used, 3);
}

#[tokio::test(start_paused = true)]
async fn unsupported_aspect_ratio_blocks_publish() {
    let (client, transport) = client();
    transport.image(1080, 1920);

    let err = client
        .publish_media(&PublishMediaRequest {
            image_url: Some("https://cdn.example.com/story.png".to_string()),
            ..PublishMediaRequest::default()
        })
        .await
        .unwrap_err();

    let GraphError::Validation { message, .. } = err else {
        panic!("expected Validation, got {err:?}");
    };
    assert!(message.contains("1080:1920"));
    assert!(message.contains("1:1"));
    // Only the download went out; no container was created.
    assert_eq!(transport.calls(), 1);
    let status = client.rate_limit_status().rate_limits;
    assert_eq!(status.publishing.used, 0);
    assert_eq!(status.requests.used, 0);
}

#[tokio::test(start_paused = true)]
async fn unreadable_image_blocks_publish() {
    let (client, transport) = client();
    transport.respond_bytes(404, b"not found".to_vec());
    transport.respond_bytes(200, b"<html>not an image</html>".to_vec());

    let request = PublishMediaRequest {
        image_url: Some("https://cdn.example.com/roast.jpg".to_string()),
        ..PublishMediaRequest::default()
    };

    let err = client.publish_media(&request).await.unwrap_err();
    assert!(err.to_string().contains("failed to download image for validation"));

    let err = client.publish_media(&request).await.unwrap_err();
    assert!(matches!(err, GraphError::Validation { .. }));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_publish_keeps_daily_slot() {
    let mut config = config();
    config.limits.posts_per_day = 1;
    config.backoff = no_backoff();
    let (client, transport) = client_with(config);
    transport.ok(json!({"id": "container-1"}));
    transport.respond(500, json!({"error": {"message": "Service temporarily unavailable", "code": 1}}));
    transport.ok(json!({"id": "container-2"}));
    transport.ok(json!({"id": "1790000000002"}));

    let request = PublishMediaRequest {
        video_url: Some("https://cdn.example.com/reel.mp4".to_string()),
        ..PublishMediaRequest::default()
    };

    let err = client.publish_media(&request).await.unwrap_err();
    assert!(matches!(err, GraphError::Upstream { status: 500, .. }));
    assert_eq!(client.rate_limit_status().rate_limits.publishing.used, 0);

    client.publish_media(&request).await.unwrap();
    let Some(RequestBody::Form(fields)) = transport.request(2).body else {
        panic!("expected form body");
    };
    assert_eq!(fields["media_type"], "REELS");

    let err = client.publish_media(&request).await.unwrap_err();
    assert!(matches!(
        err,
        GraphError::RateLimited {
            quota: Quota::Publishing,
            ..
        }
    ));
    assert_eq!(transport.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn invalid_publish_makes_no_calls() {
    let (client, transport) = client();
    let request = PublishMediaRequest {
        image_url: Some("https://cdn.example.com/roast.bmp".to_string()),
        ..PublishMediaRequest::default()
    };

    let err = client.publish_media(&request).await.unwrap_err();
    assert!(matches!(err, GraphError::Validation { .. }));
    assert_eq!(transport.calls(), 0);
    assert_eq!(client.rate_limit_status().rate_limits.publishing.used, 0);
}

#[tokio::test(start_paused = true)]
async fn conversations_default_to_first_page() {
    let (client, transport) = client();
    transport.ok(json!({"data": [
        {"id": "page-1", "name": "Coffee Shop"},
        {"id": "page-2", "name": "Other"}
    ]}));
    transport.ok(json!({"data": [
        {"id": "t_1", "updated_time": "2024-05-01T12:00:00+0000", "message_count": 4}
    ]}));

    let conversations = client.get_conversations(None, 10).await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].message_count, Some(4));

    let request = transport.request(1);
    assert_eq!(
        request.url,
        "https://graph.facebook.com/v22.0/page-1/conversations"
    );
    assert_eq!(transport.query(1, "platform").as_deref(), Some("instagram"));
}

#[tokio::test(start_paused = true)]
async fn conversations_without_pages_fail_validation() {
    let (client, transport) = client();
    transport.ok(json!({"data": []}));

    let err = client.get_conversations(None, 10).await.unwrap_err();
    assert!(matches!(err, GraphError::Validation { .. }));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn messaging_without_advanced_access() {
    let (client, transport) = client();
    transport.graph_error(400, 2, "Service temporarily unavailable");

    let err = client.get_conversation_messages("t_1", 20).await.unwrap_err();

    assert!(err.requires_advanced_access());
    assert!(matches!(
        err,
        GraphError::Permission {
            tier: AccessTier::Advanced,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn send_message_posts_json_body() {
    let (client, transport) = client();
    transport.ok(json!({"recipient_id": "9001", "message_id": "m_1"}));

    let sent = client
        .send_message(&SendMessageRequest {
            recipient_id: "9001".to_string(),
            message: "Thanks for reaching out!".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(sent.message_id, "m_1");

    let request = transport.request(0);
    assert_eq!(request.url, "https://graph.facebook.com/v22.0/me/messages");
    assert_eq!(
        request.body,
        Some(RequestBody::Json(json!({
            "recipient": {"id": "9001"},
            "message": {"text": "Thanks for reaching out!"}
        })))
    );
}

#[tokio::test(start_paused = true)]
async fn messaging_window_error_passes_through() {
    let (client, transport) = client();
    transport.respond(
        400,
        json!({"error": {
            "message": "This message is sent outside of allowed window.",
            "code": 10,
            "error_subcode": 2_018_278
        }}),
    );

    let err = client
        .send_message(&SendMessageRequest {
            recipient_id: "9001".to_string(),
            message: "hello".to_string(),
        })
        .await
        .unwrap_err();

    let detail = err.detail().unwrap();
    assert!(detail.is_messaging_window());
    assert_eq!(detail.message, "This message is sent outside of allowed window.");
    assert!(!err.requires_advanced_access());
}
