//! Notification creation over HTTP.

use crate::{ClientError, endpoint, http_client};
use reqwest::{StatusCode, Url};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tunestream_core::{NewNotification, NotificationSink, NotifyError};

/// POSTs notifications to `{notifications}/notifications`.
#[derive(Debug, Clone)]
pub struct HttpNotificationSink {
    client: reqwest::Client,
    url: Url,
}

impl HttpNotificationSink {
    /// Create a sink for the notifications service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: endpoint(base_url, "notifications")?,
        })
    }

    async fn create(&self, notification: NewNotification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&notification)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(()),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let body = response.text().await.unwrap_or_default();
                Err(NotifyError::Invalid(body))
            }
            status => Err(NotifyError::Rejected {
                status: status.as_u16(),
            }),
        }
    }
}

impl NotificationSink for HttpNotificationSink {
    fn dispatch(
        &self,
        notification: NewNotification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(self.create(notification))
    }
}
