//! Push connection supervision.
//!
//! [`StreamManager`] runs as one task and reacts to four inputs: the session
//! signal, the shutdown signal, events from the live connection and the single
//! pending timer. It owns at most one [`StreamHandle`] and at most one
//! [`PendingTimer`]; replacing either drops the previous one, which closes the
//! connection or cancels the sleep.
//!
//! Failures are counted in a [`ReconnectPolicyState`]. Below the circuit
//! threshold a failure schedules a plain reconnect after the backoff delay.
//! Once the threshold is reached the manager stops reconnecting blindly and
//! instead schedules recovery probes at the backoff ceiling: each probe loads a
//! full snapshot and only reopens the stream if that succeeds.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use pulsefeed_streaming::{EventSource, SseFrame, StreamEvent, StreamHandle};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, Sleep};
use tracing::{debug, info, instrument, trace, warn};

use crate::api::NotificationApi;
use crate::backoff::{BackoffPolicy, ReconnectPolicyState};
use crate::config::FeedConfig;
use crate::model::{ConnectionState, Notification, UserId};
use crate::snapshot::SnapshotLoader;
use crate::store::SharedStore;

/// Frame name carrying a notification payload.
pub const NOTIFICATION_EVENT: &str = "notification";

/// What a pending timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Reopen the stream.
    Reconnect,
    /// Load a snapshot, then reopen the stream if it succeeded.
    RecoveryProbe,
}

/// The manager's only timer.
#[derive(Debug)]
pub struct PendingTimer {
    kind: TimerKind,
    deadline: Instant,
    sleep: Pin<Box<Sleep>>,
}

impl PendingTimer {
    fn new(kind: TimerKind, delay: Duration) -> Self {
        let deadline = Instant::now() + delay;
        Self {
            kind,
            deadline,
            sleep: Box::pin(tokio::time::sleep_until(deadline)),
        }
    }
}

/// Counters kept over the manager's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    /// Calls to `EventSource::open`.
    pub connection_attempts: u64,
    /// Streams the server accepted.
    pub successful_connections: u64,
    /// Opens that failed plus streams that ended.
    pub failed_connections: u64,
    /// Notifications delivered to the store from the stream.
    pub events_processed: u64,
    /// Notification frames dropped because they did not parse.
    pub malformed_frames: u64,
    /// Snapshot loads, session starts included.
    pub snapshot_loads: u64,
    /// Recovery probes fired.
    pub recovery_probes: u64,
}

/// Point-in-time view of the manager for hosts and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedDiagnostics {
    /// Failures since the last successful open.
    pub consecutive_failures: u32,
    /// Whether only recovery probes are being attempted.
    pub circuit_open: bool,
    /// Kind of the pending timer, if one is armed.
    pub pending_timer: Option<TimerKind>,
    /// Whether a connection handle is held.
    pub connection_live: bool,
    /// Lifetime counters.
    pub stats: ManagerStats,
}

/// Drives the push connection for one signed-in user at a time.
pub struct StreamManager {
    loader: SnapshotLoader,
    source: Arc<dyn EventSource>,
    store: SharedStore,
    state: watch::Sender<ConnectionState>,
    diagnostics: watch::Sender<FeedDiagnostics>,
    policy: BackoffPolicy,
    reconnect: ReconnectPolicyState,
    circuit_threshold: u32,
    connection: Option<StreamHandle>,
    timer: Option<PendingTimer>,
    session: Option<UserId>,
    stats: ManagerStats,
}

impl std::fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("state", &*self.state.borrow())
            .field("reconnect", &self.reconnect)
            .field("timer", &self.timer)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl StreamManager {
    /// Create an idle manager.
    #[must_use]
    pub fn new(
        config: &FeedConfig,
        api: Arc<dyn NotificationApi>,
        source: Arc<dyn EventSource>,
        store: SharedStore,
    ) -> Self {
        let policy = BackoffPolicy::from_config(&config.backoff);
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (diagnostics, _) = watch::channel(FeedDiagnostics::default());
        Self {
            loader: SnapshotLoader::new(api),
            source,
            store,
            state,
            diagnostics,
            reconnect: policy.reset(),
            policy,
            circuit_threshold: config.circuit_threshold,
            connection: None,
            timer: None,
            session: None,
            stats: ManagerStats::default(),
        }
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Subscribe to diagnostics updates.
    #[must_use]
    pub fn subscribe_diagnostics(&self) -> watch::Receiver<FeedDiagnostics> {
        self.diagnostics.subscribe()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Run until shutdown is signalled or either signal's sender goes away.
    ///
    /// The session value present at start is applied immediately. Everything is
    /// torn down before returning.
    pub async fn run(
        mut self,
        mut session: watch::Receiver<Option<UserId>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let initial = session.borrow_and_update().clone();
        self.on_session(initial).await;
        self.publish();

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Notification manager received shutdown signal");
                        break;
                    }
                }
                changed = session.changed() => {
                    if changed.is_err() {
                        info!("Session signal closed, stopping notification manager");
                        break;
                    }
                    let user = session.borrow_and_update().clone();
                    self.on_session(user).await;
                }
                event = next_stream_event(&mut self.connection) => {
                    self.on_stream_event(event);
                }
                kind = fire_timer(&mut self.timer) => {
                    self.on_timer(kind).await;
                }
            }
            self.publish();
        }

        self.teardown();
        self.publish();
    }

    async fn on_session(&mut self, user: Option<UserId>) {
        match (user, self.session.as_ref()) {
            (None, None) => {}
            (None, Some(current)) => {
                info!(user = %current, "Session ended");
                self.teardown();
            }
            (Some(user), Some(current)) if &user == current => {
                debug!(user = %user, "Session unchanged");
            }
            (Some(user), current) => {
                if let Some(current) = current {
                    info!(from = %current, to = %user, "Session switched user");
                    self.teardown();
                }
                self.start_session(user).await;
            }
        }
    }

    #[instrument(skip_all, fields(user = %user))]
    async fn start_session(&mut self, user: UserId) {
        info!("Session started, loading notifications");
        self.session = Some(user);
        self.reconnect = self.policy.reset();
        self.set_state(ConnectionState::Connecting);

        if self.load_and_seed().await {
            self.open_stream().await;
        } else {
            self.set_state(ConnectionState::Disconnected);
            self.arm(TimerKind::RecoveryProbe, self.policy.ceiling());
        }
    }

    async fn load_and_seed(&mut self) -> bool {
        self.stats.snapshot_loads += 1;
        match self.loader.load().await {
            Ok(list) => {
                self.store.update(|store| store.seed(list));
                true
            }
            Err(_) => false,
        }
    }

    async fn open_stream(&mut self) {
        self.release();
        self.set_state(ConnectionState::Connecting);
        self.stats.connection_attempts += 1;

        match self.source.open().await {
            Ok(handle) => {
                debug!(attempt = self.stats.connection_attempts, "Stream connection started");
                self.connection = Some(handle);
            }
            Err(e) => {
                warn!(error = %e, "Failed to open notification stream");
                // Passes through to Disconnected in on_failure.
                self.set_state(ConnectionState::Error);
                self.on_failure(&e.to_string());
            }
        }
    }

    fn on_stream_event(&mut self, event: Option<StreamEvent>) {
        match event {
            Some(StreamEvent::Opened) => {
                self.stats.successful_connections += 1;
                self.reconnect = self.policy.reset();
                self.set_state(ConnectionState::Connected);
                info!("Notification stream connected");
            }
            Some(StreamEvent::Frame(frame)) => self.on_frame(&frame),
            Some(StreamEvent::Heartbeat) => trace!("Notification stream keep-alive"),
            Some(StreamEvent::Closed { reason }) => {
                self.connection = None;
                self.on_failure(&reason);
            }
            None => {
                self.connection = None;
                self.on_failure("event channel closed");
            }
        }
    }

    fn on_frame(&mut self, frame: &SseFrame) {
        if !frame.is_named(NOTIFICATION_EVENT) {
            debug!(event = %frame.event, "Ignoring stream frame");
            return;
        }

        match serde_json::from_str::<Notification>(&frame.data) {
            Ok(notification) => {
                debug!(id = %notification.id, "Received notification");
                self.stats.events_processed += 1;
                self.store.update(|store| store.ingest(notification));
            }
            Err(e) => {
                self.stats.malformed_frames += 1;
                warn!(error = %e, bytes = frame.data.len(), "Dropping malformed notification frame");
            }
        }
    }

    async fn on_timer(&mut self, kind: TimerKind) {
        self.timer = None;
        match kind {
            TimerKind::Reconnect if self.circuit_open() => {
                warn!(
                    consecutive_failures = self.reconnect.consecutive_failures,
                    probe_in_ms = duration_ms(self.policy.ceiling()),
                    "Notification stream keeps failing, switching to recovery probes"
                );
                self.set_state(ConnectionState::Disconnected);
                self.arm(TimerKind::RecoveryProbe, self.policy.ceiling());
            }
            TimerKind::Reconnect => {
                debug!(
                    consecutive_failures = self.reconnect.consecutive_failures,
                    "Reconnecting notification stream"
                );
                self.open_stream().await;
            }
            TimerKind::RecoveryProbe => {
                self.stats.recovery_probes += 1;
                info!("Running notification recovery probe");
                if self.load_and_seed().await {
                    self.reconnect = self.policy.reset();
                    self.open_stream().await;
                } else {
                    self.arm(TimerKind::RecoveryProbe, self.policy.ceiling());
                }
            }
        }
    }

    fn on_failure(&mut self, reason: &str) {
        self.release();
        self.stats.failed_connections += 1;

        let (next, delay) = self.policy.record_failure(self.reconnect);
        self.reconnect = next;
        self.set_state(ConnectionState::Disconnected);
        warn!(
            reason,
            consecutive_failures = next.consecutive_failures,
            delay_ms = duration_ms(delay),
            "Notification stream lost, scheduling reconnect"
        );
        self.arm(TimerKind::Reconnect, delay);
    }

    fn teardown(&mut self) {
        self.release();
        self.store.update(|store| store.clear());
        self.reconnect = self.policy.reset();
        self.session = None;
        self.set_state(ConnectionState::Idle);
    }

    /// Drop the connection and cancel the timer.
    fn release(&mut self) {
        if self.connection.take().is_some() {
            debug!("Closed notification stream");
        }
        self.timer = None;
    }

    fn arm(&mut self, kind: TimerKind, delay: Duration) {
        debug!(?kind, delay_ms = duration_ms(delay), "Timer armed");
        self.timer = Some(PendingTimer::new(kind, delay));
    }

    const fn circuit_open(&self) -> bool {
        self.reconnect.consecutive_failures >= self.circuit_threshold
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!(from = %state, to = %next, "Connection state changed");
            *state = next;
            true
        });
    }

    fn publish(&self) {
        let current = FeedDiagnostics {
            consecutive_failures: self.reconnect.consecutive_failures,
            circuit_open: self.circuit_open(),
            pending_timer: self.timer.as_ref().map(|timer| timer.kind),
            connection_live: self.connection.is_some(),
            stats: self.stats.clone(),
        };
        self.diagnostics.send_if_modified(|diagnostics| {
            if *diagnostics == current {
                false
            } else {
                *diagnostics = current;
                true
            }
        });
    }
}

async fn next_stream_event(connection: &mut Option<StreamHandle>) -> Option<StreamEvent> {
    match connection {
        Some(handle) => handle.next_event().await,
        None => pending().await,
    }
}

async fn fire_timer(timer: &mut Option<PendingTimer>) -> TimerKind {
    match timer {
        Some(timer) => {
            timer.sleep.as_mut().await;
            trace!(deadline = ?timer.deadline, "Timer fired");
            timer.kind
        }
        None => pending().await,
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
