//! Notification-creation collaborator used by subscription fan-out.

use crate::model::NewNotification;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from creating a notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The notifications service could not be reached or timed out.
    #[error("Notification transport failed: {0}")]
    Transport(String),

    /// The notifications service answered with an unexpected status.
    #[error("Notification rejected with status {status}")]
    Rejected {
        /// HTTP status received.
        status: u16,
    },

    /// The request was refused as invalid.
    #[error("Invalid notification: {0}")]
    Invalid(String),
}

/// Creates one notification per call.
///
/// Each call is independent: fan-out keeps going when a single dispatch fails.
pub trait NotificationSink: Send + Sync {
    /// Create `notification`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the notification was not created.
    fn dispatch(
        &self,
        notification: NewNotification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}
