//! pulsefeed notification client.
//!
//! Keeps a bounded, deduplicated list of a user's notifications in sync with
//! the server:
//!
//! - [`SnapshotLoader`]: full-list fetch at session start and for recovery
//! - [`BackoffPolicy`]: reconnect delays between a floor and a ceiling
//! - [`StreamManager`]: push connection state machine with a failure circuit
//! - [`NotificationStore`]: most-recent-first list with a derived unread count
//! - [`NotificationService`]: the host-facing handle tying these together
//!
//! # Example
//!
//! ```ignore
//! use pulsefeed_client::{FeedConfig, NotificationService, UserId};
//! use tokio::sync::watch;
//!
//! let config = FeedConfig::new().with_base_url("https://learn.example.com");
//! let (session_tx, session_rx) = watch::channel(None);
//! let service = NotificationService::init(&config, session_rx)?;
//!
//! session_tx.send(Some(UserId::new("42")))?;
//! // ... later
//! println!("{} unread", service.unread_count());
//! service.shutdown().await;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod backoff;
pub mod config;
mod error;
pub mod manager;
pub mod model;
pub mod service;
pub mod snapshot;
pub mod store;

pub use api::{HttpNotificationApi, NotificationApi};
pub use backoff::{BackoffPolicy, ReconnectPolicyState};
pub use config::{BackoffConfig, FeedConfig};
pub use error::{FeedError, FeedResult};
pub use manager::{FeedDiagnostics, ManagerStats, StreamManager, TimerKind};
pub use model::{ConnectionState, CreatedAt, Notification, NotificationId, UserId};
pub use service::NotificationService;
pub use snapshot::{SnapshotLoader, parse_snapshot};
pub use store::{NotificationStore, SharedStore};
