//! Full-list fetch used at session start and for recovery probes.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::api::NotificationApi;
use crate::error::{FeedError, FeedResult};
use crate::model::Notification;

/// Decode a snapshot body.
///
/// Accepts a bare JSON array or an envelope carrying the array under `data`
/// (`{"success": true, "data": [...]}`). A `null` `data` is an empty list.
///
/// # Errors
/// Returns `FeedError::Json` for invalid JSON or entries that are not
/// notifications, and `FeedError::MalformedBody` for any other shape.
pub fn parse_snapshot(body: &[u8]) -> FeedResult<Vec<Notification>> {
    let value: Value = serde_json::from_slice(body)?;
    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut envelope) => match envelope.remove("data") {
            Some(Value::Null) => return Ok(Vec::new()),
            Some(list @ Value::Array(_)) => list,
            Some(other) => {
                return Err(FeedError::MalformedBody(format!(
                    "snapshot data is {}, expected an array",
                    json_kind(&other)
                )));
            }
            None => {
                return Err(FeedError::MalformedBody(
                    "snapshot object has no data field".to_string(),
                ));
            }
        },
        other => {
            return Err(FeedError::MalformedBody(format!(
                "snapshot is {}, expected an array or object",
                json_kind(&other)
            )));
        }
    };
    Ok(serde_json::from_value(list)?)
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Loads the server's current notification list.
#[derive(Clone)]
pub struct SnapshotLoader {
    api: Arc<dyn NotificationApi>,
}

impl std::fmt::Debug for SnapshotLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotLoader").finish_non_exhaustive()
    }
}

impl SnapshotLoader {
    /// Create a loader over `api`.
    #[must_use]
    pub fn new(api: Arc<dyn NotificationApi>) -> Self {
        Self { api }
    }

    /// Fetch the list. One request; local state is never touched here.
    ///
    /// # Errors
    /// Whatever the API reports.
    pub async fn load(&self) -> FeedResult<Vec<Notification>> {
        match self.api.fetch_snapshot().await {
            Ok(list) => {
                info!(count = list.len(), "Loaded notification snapshot");
                Ok(list)
            }
            Err(e) => {
                warn!(error = %e, retryable = e.is_retryable(), "Notification snapshot failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CreatedAt;

    #[test]
    fn bare_array() {
        let list = parse_snapshot(br#"[{"id": 1, "is_read": false}, {"id": "2", "is_read": true}]"#)
            .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id.as_str(), "1");
        assert!(list[1].is_read);
    }

    #[test]
    fn success_envelope() {
        let list = parse_snapshot(
            br#"{"success": true, "data": [{"id": "a", "title": "Hi", "message": "m"}]}"#,
        )
        .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "Hi");
    }

    #[test]
    fn null_data_is_empty() {
        assert!(parse_snapshot(br#"{"success": true, "data": null}"#).unwrap().is_empty());
    }

    #[test]
    fn other_shapes_are_malformed() {
        assert!(matches!(
            parse_snapshot(br#"{"success": false, "error": "nope"}"#),
            Err(FeedError::MalformedBody(_))
        ));
        assert!(matches!(
            parse_snapshot(br#"{"data": {"id": 1}}"#),
            Err(FeedError::MalformedBody(msg)) if msg.contains("an object")
        ));
        assert!(matches!(parse_snapshot(b"42"), Err(FeedError::MalformedBody(_))));
    }

    #[test]
    fn loose_display_fields_do_not_fail_the_list() {
        let list = parse_snapshot(
            br#"[
                {"id": 1, "title": "a", "message": "m", "created_at": 1709294400.5},
                {"id": 2, "title": null, "message": "m", "created_at": {"$date": "x"}},
                {"id": 3, "title": "c", "message": null}
            ]"#,
        )
        .unwrap();

        let ids: Vec<_> = list.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert!(list[0].created_at.as_ref().and_then(CreatedAt::to_utc).is_some());
        assert!(list[1].title.is_empty());
        assert!(list[1].created_at.is_none());
        assert!(list[2].message.is_empty());
    }

    #[test]
    fn invalid_json_and_entries_are_json_errors() {
        assert!(matches!(parse_snapshot(b"<html>"), Err(FeedError::Json(_))));
        assert!(matches!(
            parse_snapshot(br#"[{"title": "no id"}]"#),
            Err(FeedError::Json(_))
        ));
    }
}
