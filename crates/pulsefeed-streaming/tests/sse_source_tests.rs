//! `SseEventSource` against a fake HTTP server.

use std::time::Duration;

use pulsefeed_streaming::{
    EventSource, SseConfig, SseEventSource, SseFrame, StreamEvent, StreamHandle,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn collect(mut handle: StreamHandle) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        let done = matches!(event, StreamEvent::Closed { .. });
        events.push(event);
        if done {
            break;
        }
    }
    events
}

fn event_stream(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

#[tokio::test]
async fn delivers_open_frames_heartbeats_and_close() {
    let server = MockServer::start().await;
    let body = "retry: 10000\n\n\
                : keep-alive\n\n\
                event: notification\n\
                data: {\"id\":\"1\",\"title\":\"t\",\"message\":\"m\",\"is_read\":false}\n\n";

    Mock::given(method("GET"))
        .and(path("/api/v1/notifications/stream"))
        .and(header("accept", "text/event-stream"))
        .respond_with(event_stream(body))
        .mount(&server)
        .await;

    let source = SseEventSource::new(
        &format!("{}/api/v1/notifications/stream", server.uri()),
        SseConfig::default(),
    )
    .expect("source");

    let events = collect(source.open().await.expect("open")).await;

    assert_eq!(events[0], StreamEvent::Opened);
    assert_eq!(events[1], StreamEvent::Heartbeat);
    match &events[2] {
        StreamEvent::Frame(frame) => {
            assert!(frame.is_named("notification"));
            assert!(frame.data.contains("\"id\":\"1\""));
            assert_eq!(frame.retry, Some(Duration::from_secs(10)));
        }
        other => panic!("expected frame, got {other:?}"),
    }
    assert_eq!(
        events[3],
        StreamEvent::Closed {
            reason: "stream ended".into()
        }
    );
}

#[tokio::test]
async fn custom_headers_are_sent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/stream"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(event_stream("data: hi\n\n"))
        .mount(&server)
        .await;

    let config = SseConfig::new().with_header("Authorization", "Bearer abc");
    let source = SseEventSource::new(&format!("{}/stream", server.uri()), config).expect("source");

    let events = collect(source.open().await.expect("open")).await;
    assert_eq!(
        events[1],
        StreamEvent::Frame(SseFrame::new("message", "hi"))
    );
}

#[tokio::test]
async fn non_success_status_closes_without_opening() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&server)
        .await;

    let source =
        SseEventSource::new(&format!("{}/stream", server.uri()), SseConfig::default()).unwrap();
    let events = collect(source.open().await.expect("open")).await;

    assert_eq!(events.len(), 1);
    assert!(
        matches!(&events[0], StreamEvent::Closed { reason } if reason.contains("503")),
        "unexpected events: {events:?}"
    );
}

#[tokio::test]
async fn wrong_content_type_closes_without_opening() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let source =
        SseEventSource::new(&format!("{}/stream", server.uri()), SseConfig::default()).unwrap();
    let events = collect(source.open().await.expect("open")).await;

    assert_eq!(events.len(), 1);
    assert!(
        matches!(&events[0], StreamEvent::Closed { reason } if reason.contains("content type")),
        "unexpected events: {events:?}"
    );
}

#[tokio::test]
async fn unreachable_server_closes_with_error() {
    let config = SseConfig::new().with_connect_timeout(Duration::from_millis(500));
    // Port 9 (discard) is not expected to accept HTTP connections.
    let source = SseEventSource::new("http://127.0.0.1:9/stream", config).unwrap();
    let events = collect(source.open().await.expect("open")).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], StreamEvent::Closed { .. }));
}
