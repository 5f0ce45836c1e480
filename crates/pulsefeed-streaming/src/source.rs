//! Event source capability and the HTTP server-sent events implementation.
//!
//! An [`EventSource`] opens one connection per call. The connection is read by
//! a spawned task that forwards [`StreamEvent`]s through a bounded channel; the
//! returned [`StreamHandle`] owns that task and aborts it when dropped, so
//! releasing the handle always closes the underlying connection.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::sse::{DEFAULT_MAX_FRAME_BYTES, SseDecoder, SseFrame, SseItem};
use crate::{StreamError, StreamResult};

const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Event delivered by an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The server accepted the stream.
    Opened,
    /// A complete frame.
    Frame(SseFrame),
    /// Keep-alive comment received.
    Heartbeat,
    /// The connection ended. Always the last event of a connection.
    Closed {
        /// Why the connection ended.
        reason: String,
    },
}

/// Handle for a single stream connection attempt.
///
/// Dropping the handle aborts the reader task and with it the connection.
#[derive(Debug)]
pub struct StreamHandle {
    events: mpsc::Receiver<StreamEvent>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl StreamHandle {
    /// Wrap an event channel and the task feeding it.
    #[must_use]
    pub const fn new(
        events: mpsc::Receiver<StreamEvent>,
        task: Option<tokio::task::JoinHandle<()>>,
    ) -> Self {
        Self { events, task }
    }

    /// Wait for the next event. `None` means the producer went away without a
    /// `Closed` event and should be treated the same way.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Close the connection.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.events.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Capability to open push connections.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a new connection.
    ///
    /// Returning `Ok` only means the attempt started; the server has accepted
    /// the stream once [`StreamEvent::Opened`] arrives.
    ///
    /// # Errors
    /// Returns an error if the attempt cannot be started at all.
    async fn open(&self) -> StreamResult<StreamHandle>;
}

/// Configuration for [`SseEventSource`].
#[derive(Debug, Clone)]
pub struct SseConfig {
    /// Time allowed for the response headers to arrive.
    pub connect_timeout: Duration,
    /// Extra request headers (cookies, bearer tokens).
    pub headers: HashMap<String, String>,
    /// Largest accepted frame.
    pub max_frame_bytes: usize,
    /// Capacity of the per-connection event channel.
    pub channel_capacity: usize,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            headers: HashMap::new(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            channel_capacity: 256,
        }
    }
}

impl SseConfig {
    /// Create new configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the frame size limit.
    #[must_use]
    pub const fn with_max_frame_bytes(mut self, size: usize) -> Self {
        self.max_frame_bytes = size;
        self
    }
}

/// Server-sent events over HTTP.
#[derive(Debug, Clone)]
pub struct SseEventSource {
    url: Url,
    client: reqwest::Client,
    headers: HeaderMap,
    config: SseConfig,
}

impl SseEventSource {
    /// Create an event source for `url`.
    ///
    /// # Errors
    /// Returns [`StreamError::ConnectionFailed`] for an invalid URL or header.
    pub fn new(url: &str, config: SseConfig) -> StreamResult<Self> {
        let url = Url::parse(url).map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM_MIME));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| StreamError::ConnectionFailed(format!("header {key}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StreamError::ConnectionFailed(format!("header {key}: {e}")))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            url,
            client,
            headers,
            config,
        })
    }

    /// Get the stream URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &SseConfig {
        &self.config
    }
}

#[async_trait]
impl EventSource for SseEventSource {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn open(&self) -> StreamResult<StreamHandle> {
        let request = self
            .client
            .get(self.url.clone())
            .headers(self.headers.clone())
            .build()?;

        let (event_tx, event_rx) = mpsc::channel(self.config.channel_capacity);
        let client = self.client.clone();
        let connect_timeout = self.config.connect_timeout;
        let max_frame_bytes = self.config.max_frame_bytes;

        let task = tokio::spawn(async move {
            let reason =
                match run_stream_once(client, request, connect_timeout, max_frame_bytes, &event_tx)
                    .await
                {
                    Ok(()) => "stream ended".to_string(),
                    Err(e) => {
                        warn!(error = %e, "Event stream failed");
                        e.to_string()
                    }
                };
            let _ = event_tx.send(StreamEvent::Closed { reason }).await;
        });

        Ok(StreamHandle::new(event_rx, Some(task)))
    }
}

/// Run a single stream connection attempt until it ends or the receiver goes away.
async fn run_stream_once(
    client: reqwest::Client,
    request: reqwest::Request,
    connect_timeout: Duration,
    max_frame_bytes: usize,
    event_tx: &mpsc::Sender<StreamEvent>,
) -> StreamResult<()> {
    info!(url = %request.url(), "Connecting to event stream");

    let response = tokio::time::timeout(connect_timeout, client.execute(request))
        .await
        .map_err(|_| StreamError::Timeout(connect_timeout))??;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        return Err(StreamError::HttpError { status, message });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.starts_with(EVENT_STREAM_MIME) {
        return Err(StreamError::UnexpectedContentType(content_type));
    }

    if event_tx.send(StreamEvent::Opened).await.is_err() {
        debug!("Event receiver dropped, stopping stream");
        return Ok(());
    }

    let mut decoder = SseDecoder::new(max_frame_bytes);
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for item in decoder.push(&chunk)? {
            let event = match item {
                SseItem::Frame(frame) => {
                    debug!(event = %frame.event, bytes = frame.data.len(), "Received frame");
                    StreamEvent::Frame(frame)
                }
                SseItem::Comment(_) => StreamEvent::Heartbeat,
            };
            if event_tx.send(event).await.is_err() {
                debug!("Event receiver dropped, stopping stream");
                return Ok(());
            }
        }
    }

    Ok(())
}
