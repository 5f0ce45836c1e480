//! Request/response side of the notification server.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, instrument};
use url::Url;

use crate::config::FeedConfig;
use crate::error::{FeedError, FeedResult};
use crate::model::{Notification, NotificationId};
use crate::snapshot::parse_snapshot;

/// Notification server endpoints used by the client.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Fetch the current notification list.
    ///
    /// # Errors
    /// Network failures, non-success statuses and malformed bodies.
    async fn fetch_snapshot(&self) -> FeedResult<Vec<Notification>>;

    /// Mark one notification read on the server.
    ///
    /// # Errors
    /// Network failures and non-success statuses.
    async fn mark_read(&self, id: &NotificationId) -> FeedResult<()>;

    /// Mark every notification read on the server.
    ///
    /// # Errors
    /// Network failures and non-success statuses.
    async fn mark_all_read(&self) -> FeedResult<()>;
}

/// [`NotificationApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpNotificationApi {
    client: reqwest::Client,
    config: FeedConfig,
    snapshot_url: Url,
    mark_all_read_url: Url,
}

impl HttpNotificationApi {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Returns `FeedError::Config` for an unusable base URL or header.
    pub fn new(config: &FeedConfig) -> FeedResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| FeedError::Config(format!("header {key}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FeedError::Config(format!("header {key}: {e}")))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            snapshot_url: config.snapshot_url()?,
            mark_all_read_url: config.mark_all_read_url()?,
            config: config.clone(),
        })
    }

    async fn post(&self, url: Url) -> FeedResult<()> {
        let response = self.client.post(url).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    #[instrument(skip(self), fields(url = %self.snapshot_url))]
    async fn fetch_snapshot(&self) -> FeedResult<Vec<Notification>> {
        let response = self.client.get(self.snapshot_url.clone()).send().await?;
        let body = check_status(response).await?.bytes().await?;
        let notifications = parse_snapshot(&body)?;
        debug!(count = notifications.len(), "Fetched notification snapshot");
        Ok(notifications)
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn mark_read(&self, id: &NotificationId) -> FeedResult<()> {
        self.post(self.config.mark_read_url(id)?).await
    }

    #[instrument(skip(self))]
    async fn mark_all_read(&self) -> FeedResult<()> {
        self.post(self.mark_all_read_url.clone()).await
    }
}

async fn check_status(response: reqwest::Response) -> FeedResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(FeedError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_header_is_a_config_error() {
        let config = FeedConfig::new().with_header("Bad Header", "x");
        let err = HttpNotificationApi::new(&config).unwrap_err();
        assert!(matches!(err, FeedError::Config(msg) if msg.contains("Bad Header")));
    }

    #[test]
    fn urls_are_resolved_up_front() {
        let api = HttpNotificationApi::new(&FeedConfig::new().with_base_url("http://host:8080"))
            .unwrap();
        assert_eq!(
            api.snapshot_url.as_str(),
            "http://host:8080/api/v1/notifications"
        );
        assert_eq!(
            api.mark_all_read_url.as_str(),
            "http://host:8080/api/v1/notifications/read-all"
        );
    }
}
