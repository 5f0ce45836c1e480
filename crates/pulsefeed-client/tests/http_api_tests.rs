//! HTTP endpoints against a fake notification server.

use std::time::Duration;

use pretty_assertions::assert_eq;
use pulsefeed_client::{
    ConnectionState, FeedConfig, FeedError, HttpNotificationApi, NotificationApi, NotificationId,
    NotificationService, UserId,
};
use tokio::sync::watch;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> FeedConfig {
    FeedConfig::new()
        .with_base_url(server.uri())
        .with_header("Cookie", "session=abc")
}

#[tokio::test]
async fn snapshot_envelope_is_unwrapped() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/notifications"))
        .and(header("cookie", "session=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "data": [
                {"id": "b", "title": "Review", "message": "m", "type": "review", "is_read": false,
                 "created_at": "2024-03-01T12:00:00.000001"},
                {"id": "a", "title": "Feedback", "message": "m", "type": "feedback", "is_read": true,
                 "related_id": "sub-1", "created_at": "2024-02-28T08:00:00"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpNotificationApi::new(&config_for(&server))?;
    let list = api.fetch_snapshot().await?;

    let ids: Vec<_> = list.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert_eq!(list[1].related_id.as_deref(), Some("sub-1"));
    Ok(())
}

#[tokio::test]
async fn snapshot_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/notifications"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let api = HttpNotificationApi::new(&config_for(&server)).expect("api");
    let err = api.fetch_snapshot().await.unwrap_err();

    assert!(
        matches!(&err, FeedError::Api { status: 500, message } if message == "boom"),
        "unexpected error: {err:?}"
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn snapshot_with_unexpected_shape_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/notifications"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": false})),
        )
        .mount(&server)
        .await;

    let api = HttpNotificationApi::new(&config_for(&server)).expect("api");
    let err = api.fetch_snapshot().await.unwrap_err();
    assert!(matches!(err, FeedError::MalformedBody(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn mutations_post_to_their_endpoints() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/notification/abc123/read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/notifications/read-all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpNotificationApi::new(&config_for(&server))?;
    api.mark_read(&NotificationId::from("abc123")).await?;
    api.mark_all_read().await?;
    Ok(())
}

#[tokio::test]
async fn mutation_rejection_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/notification/7/read"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Notification not found"))
        .mount(&server)
        .await;

    let api = HttpNotificationApi::new(&config_for(&server)).expect("api");
    let err = api.mark_read(&NotificationId::from(7_i64)).await.unwrap_err();

    assert!(matches!(err, FeedError::Api { status: 404, .. }), "unexpected error: {err:?}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn service_loads_snapshot_and_applies_pushed_frames() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "data": [{"id": 1, "title": "old", "message": "m", "is_read": false}]
        })))
        .mount(&server)
        .await;
    let body = "retry: 10000\n\n\
                : keep-alive\n\n\
                event: notification\n\
                data: {\"id\": 2, \"title\": \"new\", \"message\": \"m\", \"is_read\": false}\n\n";
    Mock::given(method("GET"))
        .and(path("/api/v1/notifications/stream"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/notifications/read-all"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (session, session_rx) = watch::channel(None);
    let service = NotificationService::init(&config_for(&server), session_rx)?;
    let mut changes = service.subscribe_changes();
    session.send_replace(Some(UserId::new("42")));

    tokio::time::timeout(Duration::from_secs(5), async {
        while service.notifications().len() < 2 {
            changes.changed().await?;
        }
        anyhow::Ok(())
    })
    .await??;

    let titles: Vec<_> = service
        .notifications()
        .into_iter()
        .map(|n| n.title)
        .collect();
    assert_eq!(titles, vec!["new", "old"]);
    assert_eq!(service.unread_count(), 2);

    service.mark_all_read().await;
    assert_eq!(service.unread_count(), 0);

    // The fake stream ends after its body, so the feed is now between reconnects.
    let mut state = service.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Disconnected),
    )
    .await??;
    assert_eq!(service.diagnostics().consecutive_failures, 1);

    service.shutdown().await;
    Ok(())
}
