//! Error types for web handlers.
//!
//! [`AppError`] is the one place where domain errors become HTTP statuses.
//! Handlers return `Result<_, AppError>` and use `?` on service results; the
//! `From` impls below pick the status.
//!
//! | status | when |
//! |---|---|
//! | 400 | malformed input, unknown event type, song on a missing album |
//! | 404 | genuine miss (record, or a foreign reference that does not exist) |
//! | 409 | duplicate subscription |
//! | 422 | validation failure (blank field, rating outside 1..=5) |
//! | 429 | admission rejection |
//! | 503 | breaker open or gateway upstream down; plain-text body |
//! | 500 | anything else |

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use tunestream_core::{EventError, StoreError};
use tunestream_services::{CatalogError, NotificationError, RatingError, SubscriptionError};

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<RatingsState>) -> Result<Json<Rating>, AppError> {
///     let rating = state.ratings.get(&song, &user).await?
///         .ok_or_else(|| AppError::not_found("Rating", &song))?;
///     Ok(Json(rating))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: &'static str) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach an internal cause (logged, never sent).
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST")
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND",
        )
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), "CONFLICT")
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            message.into(),
            "VALIDATION_ERROR",
        )
    }

    /// Create a 429 Too Many Requests error.
    #[must_use]
    pub fn too_many_requests() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests".to_string(),
            "RATE_LIMITED",
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR",
        )
    }

    /// Create a 503 Service Unavailable error. Rendered as plain text.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE",
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: &'static str,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::warn!(code = self.code, message = %self.message, "Dependency unavailable");
            return (
                self.status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                self.message,
            )
                .into_response();
        }

        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::new(StatusCode::NOT_FOUND, what, "NOT_FOUND"),
            StoreError::Duplicate(what) => Self::conflict(what),
            StoreError::Unavailable(_) => {
                Self::unavailable("Service temporarily unavailable").with_source(err.into())
            }
            StoreError::Backend(_) => {
                Self::internal("An internal error occurred").with_source(err.into())
            }
        }
    }
}

impl From<EventError> for AppError {
    fn from(err: EventError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<SubscriptionError> for AppError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::MissingField(_) => Self::validation(err.to_string()),
            SubscriptionError::Duplicate { .. } => Self::conflict(err.to_string()),
            SubscriptionError::ArtistNotFound(id) => Self::not_found("Artist", id),
            SubscriptionError::Unavailable => Self::unavailable(err.to_string()),
            SubscriptionError::NotFound => {
                Self::new(StatusCode::NOT_FOUND, err.to_string(), "NOT_FOUND")
            }
            SubscriptionError::Store(e) => e.into(),
        }
    }
}

impl From<RatingError> for AppError {
    fn from(err: RatingError) -> Self {
        match err {
            RatingError::MissingField(_) | RatingError::Invalid(_) => {
                Self::validation(err.to_string())
            }
            RatingError::SongNotFound(id) => Self::not_found("Song", id),
            RatingError::Unavailable => Self::unavailable(err.to_string()),
            RatingError::NotFound => Self::new(StatusCode::NOT_FOUND, err.to_string(), "NOT_FOUND"),
            RatingError::Store(e) => e.into(),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::MissingField(_) => Self::validation(err.to_string()),
            CatalogError::UnknownAlbum(_) => Self::bad_request(err.to_string()),
            CatalogError::NotFound { what, id } => Self::not_found(what, id),
            CatalogError::Store(e) => e.into(),
        }
    }
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::MissingField(_) => Self::validation(err.to_string()),
            NotificationError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use tunestream_core::InvalidRating;

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_not_found() {
        let err = AppError::not_found("Song", "s1");
        assert_eq!(err.to_string(), "[NOT_FOUND] Song with id s1 not found");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn breaker_open_and_genuine_miss_differ() {
        assert_eq!(
            AppError::from(RatingError::Unavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(RatingError::SongNotFound("s1".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(SubscriptionError::Unavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(SubscriptionError::ArtistNotFound("a1".into())).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn domain_statuses() {
        let duplicate = SubscriptionError::Duplicate {
            kind: "genre",
            value: "Rock".into(),
        };
        assert_eq!(AppError::from(duplicate).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::from(RatingError::Invalid(InvalidRating(9))).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(CatalogError::UnknownAlbum("b1".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(EventError::MissingType).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(StoreError::Backend("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn unavailable_is_plain_text() {
        let response = AppError::unavailable("Content service temporarily unavailable").into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "Content service temporarily unavailable");
    }

    #[tokio::test]
    async fn other_errors_are_json() {
        let response = AppError::too_many_requests().into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            body_text(response).await,
            r#"{"code":"RATE_LIMITED","message":"Too many requests"}"#
        );
    }
}
