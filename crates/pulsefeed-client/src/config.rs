//! Client configuration.
//!
//! Every field has a default matching the notification server's routes, so a
//! host usually only sets `base_url` and whatever credential headers it needs.
//! Configuration can be built in code or read from TOML:
//!
//! ```toml
//! base_url = "https://learn.example.com"
//! capacity = 50
//! circuit_threshold = 5
//!
//! [backoff]
//! floor_ms = 5000
//! ceiling_ms = 60000
//! multiplier = 1.5
//!
//! [headers]
//! Cookie = "session=..."
//! ```

use std::collections::HashMap;
use std::time::Duration;

use pulsefeed_streaming::SseConfig;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FeedError, FeedResult};
use crate::model::NotificationId;

/// Placeholder replaced by the notification id in `mark_read_path`.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Reconnect delay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// First delay after a failure (milliseconds). Default: 5000.
    pub floor_ms: u64,
    /// Delay never grows past this (milliseconds); also the recovery probe
    /// interval once the circuit is open. Default: 60000.
    pub ceiling_ms: u64,
    /// Growth factor per consecutive failure. Default: 1.5.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            floor_ms: 5_000,
            ceiling_ms: 60_000,
            multiplier: 1.5,
        }
    }
}

/// Notification client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Server origin, optionally with a path prefix.
    pub base_url: String,
    /// Snapshot endpoint (GET).
    pub snapshot_path: String,
    /// Event stream endpoint (GET, `text/event-stream`).
    pub stream_path: String,
    /// Mark-one-read endpoint (POST); must contain `{id}`.
    pub mark_read_path: String,
    /// Mark-all-read endpoint (POST).
    pub mark_all_read_path: String,
    /// Headers sent with every request.
    pub headers: HashMap<String, String>,
    /// Maximum number of notifications kept. Default: 50.
    pub capacity: usize,
    /// Reconnect delays.
    pub backoff: BackoffConfig,
    /// Consecutive stream failures before only recovery probes are attempted.
    /// Default: 5.
    pub circuit_threshold: u32,
    /// Timeout for snapshot and mutation requests (milliseconds).
    pub request_timeout_ms: u64,
    /// Timeout for establishing connections (milliseconds).
    pub connect_timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            snapshot_path: "/api/v1/notifications".to_string(),
            stream_path: "/api/v1/notifications/stream".to_string(),
            mark_read_path: "/api/v1/notification/{id}/read".to_string(),
            mark_all_read_path: "/api/v1/notifications/read-all".to_string(),
            headers: HashMap::new(),
            capacity: 50,
            backoff: BackoffConfig::default(),
            circuit_threshold: 5,
            request_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl FeedConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML configuration.
    ///
    /// # Errors
    /// Returns `FeedError::Config` if the TOML is invalid or fails validation.
    pub fn from_toml_str(raw: &str) -> FeedResult<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| FeedError::Config(format!("invalid TOML: {e}")))?;
        config
            .validate()
            .map_err(|errors| FeedError::Config(errors.join("; ")))?;
        Ok(config)
    }

    /// Builder: set the server origin.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builder: add a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Builder: set the list capacity.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builder: set backoff delays.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Builder: set the circuit threshold.
    #[must_use]
    pub const fn with_circuit_threshold(mut self, threshold: u32) -> Self {
        self.circuit_threshold = threshold;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!(
                "base_url scheme must be http or https, got {}",
                url.scheme()
            )),
            Err(e) => errors.push(format!("base_url is invalid: {e}")),
        }
        if !self.mark_read_path.contains(ID_PLACEHOLDER) {
            errors.push(format!("mark_read_path must contain {ID_PLACEHOLDER}"));
        }
        if self.capacity == 0 {
            errors.push("capacity must be > 0".to_string());
        }
        if self.backoff.floor_ms == 0 {
            errors.push("backoff.floor_ms must be > 0".to_string());
        }
        if self.backoff.ceiling_ms < self.backoff.floor_ms {
            errors.push("backoff.ceiling_ms must be >= backoff.floor_ms".to_string());
        }
        if !(self.backoff.multiplier.is_finite() && self.backoff.multiplier >= 1.0) {
            errors.push("backoff.multiplier must be a finite value >= 1.0".to_string());
        }
        if self.circuit_threshold == 0 {
            errors.push("circuit_threshold must be > 0".to_string());
        }
        if self.request_timeout_ms == 0 {
            errors.push("request_timeout_ms must be > 0".to_string());
        }
        if self.connect_timeout_ms == 0 {
            errors.push("connect_timeout_ms must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Timeout for snapshot and mutation requests.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Timeout for establishing connections.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Snapshot endpoint URL.
    ///
    /// # Errors
    /// Returns `FeedError::Config` if `base_url` is unusable.
    pub fn snapshot_url(&self) -> FeedResult<Url> {
        self.endpoint(&self.snapshot_path, None)
    }

    /// Event stream URL.
    ///
    /// # Errors
    /// Returns `FeedError::Config` if `base_url` is unusable.
    pub fn stream_url(&self) -> FeedResult<Url> {
        self.endpoint(&self.stream_path, None)
    }

    /// Mark-one-read URL for `id`. The id is percent-encoded as one path segment.
    ///
    /// # Errors
    /// Returns `FeedError::Config` if `base_url` is unusable.
    pub fn mark_read_url(&self, id: &NotificationId) -> FeedResult<Url> {
        self.endpoint(&self.mark_read_path, Some(id.as_str()))
    }

    /// Mark-all-read URL.
    ///
    /// # Errors
    /// Returns `FeedError::Config` if `base_url` is unusable.
    pub fn mark_all_read_url(&self) -> FeedResult<Url> {
        self.endpoint(&self.mark_all_read_path, None)
    }

    /// Transport settings for the event stream.
    #[must_use]
    pub fn sse_config(&self) -> SseConfig {
        self.headers.iter().fold(
            SseConfig::new().with_connect_timeout(self.connect_timeout()),
            |config, (key, value)| config.with_header(key.clone(), value.clone()),
        )
    }

    fn endpoint(&self, template: &str, id: Option<&str>) -> FeedResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| FeedError::Config(format!("base_url is invalid: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| FeedError::Config("base_url cannot carry a path".to_string()))?;
            segments.pop_if_empty();
            for segment in template.split('/').filter(|s| !s.is_empty()) {
                match (segment, id) {
                    (ID_PLACEHOLDER, Some(id)) => segments.push(id),
                    _ => segments.push(segment),
                };
            }
        }
        Ok(url)
    }
}
