//! Notification store front.
//!
//! Fan-out in the subscriptions service reaches this over HTTP; in a single
//! process the service can also be used directly as a [`NotificationSink`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tunestream_core::environment::Clock;
use tunestream_core::{
    NewNotification, Notification, NotificationSink, NotificationStore, NotifyError, StoreError,
};
use uuid::Uuid;

/// Errors raised by [`NotificationService`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// A required field was empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Any store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates and lists notifications.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    clock: Arc<dyn Clock>,
}

impl NotificationService {
    /// Create a service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn NotificationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Validate and store a notification.
    ///
    /// # Errors
    ///
    /// [`NotificationError::MissingField`] if `userId`, `type` or `message`
    /// is blank.
    pub async fn create(&self, request: NewNotification) -> Result<Notification, NotificationError> {
        for (field, value) in [
            ("userId", &request.user_id),
            ("type", &request.kind),
            ("message", &request.message),
        ] {
            if value.trim().is_empty() {
                return Err(NotificationError::MissingField(field));
            }
        }

        let notification =
            Notification::from_request(Uuid::new_v4().to_string(), request, self.clock.now());
        let stored = self.store.insert(notification).await?;
        tracing::debug!(notification_id = %stored.id, user_id = %stored.user_id, kind = %stored.kind, "Notification stored");
        Ok(stored)
    }

    /// Notifications for `user_id`, newest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn for_user(&self, user_id: &str) -> Result<Vec<Notification>, NotificationError> {
        if user_id.trim().is_empty() {
            return Err(NotificationError::MissingField("userId"));
        }
        Ok(self.store.by_user(user_id).await?)
    }
}

impl NotificationSink for NotificationService {
    fn dispatch(
        &self,
        notification: NewNotification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            match self.create(notification).await {
                Ok(_) => Ok(()),
                Err(NotificationError::MissingField(field)) => {
                    Err(NotifyError::Invalid(format!("{field} is required")))
                }
                Err(NotificationError::Store(e)) => Err(NotifyError::Transport(e.to_string())),
            }
        })
    }
}
