//! In-memory [`EventSource`] that hands every opened connection to the caller.
//!
//! Used to drive stream consumers without a network stack: the caller receives
//! a [`ChannelConnection`] for each `open()` and scripts `Opened`, frames and
//! closes on it. Failing opens can be queued with
//! [`ChannelEventSource::fail_next_opens`].

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::source::{EventSource, StreamEvent, StreamHandle};
use crate::sse::SseFrame;
use crate::{StreamError, StreamResult};

/// Server side of one in-memory connection.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    id: usize,
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelConnection {
    /// Sequence number of this connection (0 for the first `open()`).
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Report the stream as accepted.
    pub async fn open(&self) -> bool {
        self.send(StreamEvent::Opened).await
    }

    /// Push a named frame.
    pub async fn frame(&self, event: &str, data: &str) -> bool {
        self.send(StreamEvent::Frame(SseFrame::new(event, data))).await
    }

    /// Push a keep-alive.
    pub async fn heartbeat(&self) -> bool {
        self.send(StreamEvent::Heartbeat).await
    }

    /// End the connection with an error reason.
    pub async fn fail(&self, reason: &str) -> bool {
        self.send(StreamEvent::Closed {
            reason: reason.to_string(),
        })
        .await
    }

    /// Whether the consumer released its handle.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Send a raw event. Returns `false` when the consumer is gone.
    pub async fn send(&self, event: StreamEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }
}

/// In-memory event source.
#[derive(Debug)]
pub struct ChannelEventSource {
    connections: mpsc::UnboundedSender<ChannelConnection>,
    fail_next: AtomicU32,
    opens: AtomicUsize,
    capacity: usize,
}

impl ChannelEventSource {
    /// Create a source and the receiver of the connections it opens.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChannelConnection>) {
        let (connections, rx) = mpsc::unbounded_channel();
        (
            Self {
                connections,
                fail_next: AtomicU32::new(0),
                opens: AtomicUsize::new(0),
                capacity: 64,
            },
            rx,
        )
    }

    /// Make the next `count` calls to `open()` fail immediately.
    pub fn fail_next_opens(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Number of `open()` calls so far, failed ones included.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn open(&self) -> StreamResult<StreamHandle> {
        let id = self.opens.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StreamError::ConnectionFailed(format!(
                "scripted failure for connection {id}"
            )));
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        self.connections
            .send(ChannelConnection { id, tx })
            .map_err(|_| StreamError::ConnectionFailed("connection receiver dropped".into()))?;

        Ok(StreamHandle::new(rx, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_hands_connection_to_caller() {
        let (source, mut connections) = ChannelEventSource::new();
        let mut handle = source.open().await.unwrap();
        let conn = connections.recv().await.unwrap();

        assert_eq!(conn.id(), 0);
        assert!(conn.open().await);
        assert!(conn.frame("notification", "{}").await);
        assert_eq!(handle.next_event().await, Some(StreamEvent::Opened));
        assert_eq!(
            handle.next_event().await,
            Some(StreamEvent::Frame(SseFrame::new("notification", "{}")))
        );
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let (source, _connections) = ChannelEventSource::new();
        source.fail_next_opens(2);

        assert!(source.open().await.is_err());
        assert!(source.open().await.is_err());
        assert!(source.open().await.is_ok());
        assert_eq!(source.open_count(), 3);
    }

    #[tokio::test]
    async fn closing_handle_is_visible_to_server_side() {
        let (source, mut connections) = ChannelEventSource::new();
        let handle = source.open().await.unwrap();
        let conn = connections.recv().await.unwrap();

        assert!(!conn.is_closed());
        handle.close();
        assert!(conn.is_closed());
        assert!(!conn.heartbeat().await);
    }
}
