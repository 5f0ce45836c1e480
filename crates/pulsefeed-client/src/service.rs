//! Host-facing notification service.

use std::sync::Arc;

use pulsefeed_streaming::{EventSource, SseEventSource};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{HttpNotificationApi, NotificationApi};
use crate::config::FeedConfig;
use crate::error::{FeedError, FeedResult};
use crate::manager::{FeedDiagnostics, StreamManager};
use crate::model::{ConnectionState, Notification, NotificationId, UserId};
use crate::store::{NotificationStore, SharedStore};

/// Live notification feed for one host.
///
/// Owns the background manager task. The feed follows the session signal it
/// was created with: a known user gets a snapshot and a push stream, an unknown
/// user gets an empty list. Dropping the service stops the task.
pub struct NotificationService {
    store: SharedStore,
    api: Arc<dyn NotificationApi>,
    state: watch::Receiver<ConnectionState>,
    diagnostics: watch::Receiver<FeedDiagnostics>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for NotificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationService")
            .field("state", &*self.state.borrow())
            .field("unread", &self.store.unread_count())
            .finish_non_exhaustive()
    }
}

impl NotificationService {
    /// Start a feed against the HTTP server described by `config`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `FeedError::Config` for invalid configuration.
    pub fn init(
        config: &FeedConfig,
        session: watch::Receiver<Option<UserId>>,
    ) -> FeedResult<Self> {
        config
            .validate()
            .map_err(|errors| FeedError::Config(errors.join("; ")))?;

        let api = Arc::new(HttpNotificationApi::new(config)?);
        let source = Arc::new(SseEventSource::new(
            config.stream_url()?.as_str(),
            config.sse_config(),
        )?);

        Self::with_parts(config, api, source, session)
    }

    /// Start a feed over caller-supplied endpoints and transport.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `FeedError::Config` for invalid configuration.
    pub fn with_parts(
        config: &FeedConfig,
        api: Arc<dyn NotificationApi>,
        source: Arc<dyn EventSource>,
        session: watch::Receiver<Option<UserId>>,
    ) -> FeedResult<Self> {
        config
            .validate()
            .map_err(|errors| FeedError::Config(errors.join("; ")))?;

        let store = SharedStore::new(config.capacity);
        let manager = StreamManager::new(config, Arc::clone(&api), source, store.clone());
        let state = manager.subscribe_state();
        let diagnostics = manager.subscribe_diagnostics();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(manager.run(session, shutdown_rx));
        info!(capacity = config.capacity, "Notification service started");

        Ok(Self {
            store,
            api,
            state,
            diagnostics,
            shutdown,
            task: Some(task),
        })
    }

    /// Notifications, most recent first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.store.snapshot()
    }

    /// Number of unread notifications.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.store.unread_count()
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether a "reconnecting…" indicator should be shown.
    #[must_use]
    pub fn connection_notice(&self) -> bool {
        self.connection_state().shows_notice()
    }

    /// Watch connection state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Watch the store revision; it changes after every list mutation that alters the list.
    #[must_use]
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    /// Latest manager diagnostics.
    #[must_use]
    pub fn diagnostics(&self) -> FeedDiagnostics {
        self.diagnostics.borrow().clone()
    }

    /// Watch manager diagnostics.
    #[must_use]
    pub fn subscribe_diagnostics(&self) -> watch::Receiver<FeedDiagnostics> {
        self.diagnostics.clone()
    }

    /// Mark one notification read.
    ///
    /// The local list changes immediately; the server call is best effort and
    /// its failure is only logged.
    pub async fn mark_as_read(&self, id: &NotificationId) {
        let changed = self
            .store
            .update_if(|store| store.mark_read(id), |changed| *changed);
        debug!(id = %id, changed, "Marked notification read locally");

        if let Err(e) = self.api.mark_read(id).await {
            warn!(id = %id, error = %e, "Failed to mark notification read on server");
        }
    }

    /// Mark every notification read.
    ///
    /// The local list changes immediately; the server call is best effort and
    /// its failure is only logged.
    pub async fn mark_all_read(&self) {
        let changed = self
            .store
            .update_if(NotificationStore::mark_all_read, |marked| *marked > 0);
        debug!(changed, "Marked all notifications read locally");

        if let Err(e) = self.api.mark_all_read().await {
            warn!(error = %e, "Failed to mark all notifications read on server");
        }
    }

    /// Stop the manager and wait for it to release its connection.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Notification manager task failed");
            }
        }
        info!("Notification service stopped");
    }
}

impl Drop for NotificationService {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
