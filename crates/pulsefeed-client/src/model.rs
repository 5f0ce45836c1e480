//! Notification data model.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Epoch values above this are taken to be milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

const EPOCH_MILLIS_FLOAT: f64 = 1e11;

/// Fractional epochs beyond this do not fit an `i64`.
const EPOCH_FLOAT_LIMIT: f64 = 9.0e18;

/// Opaque notification identifier, the dedup key.
///
/// The server may send ids as strings or integers; both normalize to the same
/// string form so `7` and `"7"` are one notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(String);

impl NotificationId {
    /// Create an id from its string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NotificationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for NotificationId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl Serialize for NotificationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => Self(s),
            RawId::Signed(n) => Self(n.to_string()),
            RawId::Unsigned(n) => Self(n.to_string()),
        })
    }
}

/// Creation timestamp as sent by the server. Display only, never used for ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CreatedAt {
    /// Seconds or milliseconds since the Unix epoch.
    Epoch(i64),
    /// ISO-8601, with or without an offset (offset-less values are UTC).
    Text(String),
}

impl<'de> Deserialize<'de> for CreatedAt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawTimestamp {
            Whole(i64),
            Fractional(f64),
            Text(String),
        }

        match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Whole(value) => Ok(Self::Epoch(value)),
            RawTimestamp::Fractional(value) => Self::from_fractional(value)
                .ok_or_else(|| D::Error::custom(format!("epoch out of range: {value}"))),
            RawTimestamp::Text(text) => Ok(Self::Text(text)),
        }
    }
}

impl CreatedAt {
    /// Fractional seconds become milliseconds; fractional milliseconds are rounded.
    #[allow(clippy::cast_possible_truncation)]
    fn from_fractional(value: f64) -> Option<Self> {
        if !value.is_finite() || value.abs() >= EPOCH_FLOAT_LIMIT {
            return None;
        }
        let millis = (value * 1000.0).round();
        let epoch = if value.abs() < EPOCH_MILLIS_FLOAT && millis.abs() >= EPOCH_MILLIS_FLOAT {
            millis
        } else {
            value.round()
        };
        Some(Self::Epoch(epoch as i64))
    }

    /// Interpret the timestamp, if it is in a recognized format.
    #[must_use]
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Epoch(value) if value.abs() >= EPOCH_MILLIS_THRESHOLD => {
                DateTime::from_timestamp_millis(*value)
            }
            Self::Epoch(value) => DateTime::from_timestamp(*value, 0),
            Self::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                        .iter()
                        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                        .map(|naive| naive.and_utc())
                }),
        }
    }
}

/// One server-pushed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Dedup key.
    pub id: NotificationId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message: String,
    /// Server category (`feedback`, `review`, `deadline`, `announcement`).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Id of the record this notification is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    /// Unrecognized values read as absent.
    #[serde(default, deserialize_with = "lenient_created_at")]
    pub created_at: Option<CreatedAt>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_created_at<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<CreatedAt>, D::Error> {
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(CreatedAt::deserialize(raw).ok())
}

impl Notification {
    /// Create an unread notification with no timestamp.
    #[must_use]
    pub fn new(
        id: impl Into<NotificationId>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            message: message.into(),
            kind: None,
            related_id: None,
            is_read: false,
            created_at: None,
        }
    }

    /// Builder: set the read flag.
    #[must_use]
    pub const fn with_read(mut self, is_read: bool) -> Self {
        self.is_read = is_read;
        self
    }

    /// Builder: set the category.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Builder: set the creation time.
    #[must_use]
    pub fn with_created_at(mut self, created_at: CreatedAt) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Relative age for display: "Just now", "5m ago", "3h ago", "2d ago",
    /// or the calendar date once a week has passed.
    #[must_use]
    pub fn time_ago(&self, now: DateTime<Utc>) -> String {
        let Some(created) = self.created_at.as_ref().and_then(CreatedAt::to_utc) else {
            return "Just now".to_string();
        };

        let elapsed = now.signed_duration_since(created);
        let minutes = elapsed.num_minutes();
        let hours = elapsed.num_hours();
        let days = elapsed.num_days();

        if minutes < 1 {
            "Just now".to_string()
        } else if minutes < 60 {
            format!("{minutes}m ago")
        } else if hours < 24 {
            format!("{hours}h ago")
        } else if days < 7 {
            format!("{days}d ago")
        } else {
            created.format("%Y-%m-%d").to_string()
        }
    }
}

/// Identity of the signed-in user, as reported by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    /// Create a user id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Push connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No session.
    #[default]
    Idle,
    /// Snapshot or stream open in progress.
    Connecting,
    /// Stream open and delivering.
    Connected,
    /// Backend unreachable or waiting to reconnect.
    Disconnected,
    /// Opening the stream failed outright.
    ///
    /// Transient: the manager moves on to `Disconnected` before it yields, so
    /// watchers only ever read the settled `Disconnected` value.
    Error,
}

impl ConnectionState {
    /// Whether a "reconnecting…" indicator should be shown.
    #[must_use]
    pub const fn shows_notice(self) -> bool {
        !matches!(self, Self::Connected | Self::Idle)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}
