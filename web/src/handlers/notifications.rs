//! Notifications service handlers.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tunestream_core::{NewNotification, Notification};

use crate::error::AppError;
use crate::state::NotificationsState;

/// Query of `GET /notifications`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxParams {
    user_id: Option<String>,
}

/// `POST /notifications` with `{userId, type, message, contentId}` → 201.
pub async fn create_notification(
    State(state): State<NotificationsState>,
    Json(request): Json<NewNotification>,
) -> Result<(StatusCode, Json<Notification>), AppError> {
    let stored = state.notifications.create(request).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// `GET /notifications?userId=`, newest first.
pub async fn list_notifications(
    State(state): State<NotificationsState>,
    Query(params): Query<InboxParams>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let inbox = state
        .notifications
        .for_user(params.user_id.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(inbox))
}
