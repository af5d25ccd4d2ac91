//! Subscriptions service handlers: event ingress, subscribe/unsubscribe and
//! index reads.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tunestream_core::{DomainEvent, Subscription, SubscriptionTarget};

use crate::error::AppError;
use crate::extractors::CorrelationId;
use crate::state::SubscriptionsState;

/// Body returned by `POST /events`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAccepted {
    /// Always `accepted`.
    pub status: &'static str,
    /// Event tag.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Subscriptions matched.
    pub matched: usize,
    /// Notifications created.
    pub dispatched: usize,
    /// Notifications that failed.
    pub failed: usize,
}

/// Event ingress.
///
/// # Endpoint
///
/// ```text
/// POST /events
/// Content-Type: application/json
///
/// { "type": "new_artist", "artistId": "a1", "name": "Nova", "genres": ["Rock"] }
/// ```
///
/// Runs fan-out before answering. Per-recipient failures are reported in the
/// body but never change the 202. Malformed bodies and unknown `type`s get 400.
pub async fn ingest_event(
    State(state): State<SubscriptionsState>,
    correlation_id: CorrelationId,
    body: Bytes,
) -> Result<(StatusCode, Json<EventAccepted>), AppError> {
    let event = DomainEvent::decode(&body).inspect_err(|error| {
        tracing::warn!(correlation_id = %correlation_id.0, error = %error, "Rejected inbound event");
    })?;

    let report = state.fanout.handle_event(&event).await;
    Ok((
        StatusCode::ACCEPTED,
        Json(EventAccepted {
            status: "accepted",
            kind: report.kind.as_str(),
            matched: report.matched,
            dispatched: report.dispatched,
            failed: report.failed,
        }),
    ))
}

/// Query of `/subscribe-artist`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistParams {
    user_id: Option<String>,
    artist_id: Option<String>,
}

/// Query of `/subscribe-genre`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenreParams {
    user_id: Option<String>,
    genre: Option<String>,
}

/// Query of `GET /subscriptions`; exactly one key.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexParams {
    user_id: Option<String>,
    artist_id: Option<String>,
    genre: Option<String>,
}

/// `POST /subscribe-artist?userId=&artistId=`
///
/// 201 with the subscription; 409 duplicate, 404 unknown artist, 503 when the
/// catalog breaker is open.
pub async fn subscribe_artist(
    State(state): State<SubscriptionsState>,
    Query(params): Query<ArtistParams>,
) -> Result<(StatusCode, Json<Subscription>), AppError> {
    let created = state
        .subscriptions
        .subscribe_artist(
            params.user_id.as_deref().unwrap_or_default(),
            params.artist_id.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `DELETE /subscribe-artist?userId=&artistId=`
pub async fn unsubscribe_artist(
    State(state): State<SubscriptionsState>,
    Query(params): Query<ArtistParams>,
) -> Result<StatusCode, AppError> {
    let target = SubscriptionTarget::artist(params.artist_id.unwrap_or_default());
    state
        .subscriptions
        .unsubscribe(params.user_id.as_deref().unwrap_or_default(), &target)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /subscribe-genre?userId=&genre=`
pub async fn subscribe_genre(
    State(state): State<SubscriptionsState>,
    Query(params): Query<GenreParams>,
) -> Result<(StatusCode, Json<Subscription>), AppError> {
    let created = state
        .subscriptions
        .subscribe_genre(
            params.user_id.as_deref().unwrap_or_default(),
            params.genre.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `DELETE /subscribe-genre?userId=&genre=`
pub async fn unsubscribe_genre(
    State(state): State<SubscriptionsState>,
    Query(params): Query<GenreParams>,
) -> Result<StatusCode, AppError> {
    let target = SubscriptionTarget::genre(params.genre.unwrap_or_default());
    state
        .subscriptions
        .unsubscribe(params.user_id.as_deref().unwrap_or_default(), &target)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /subscriptions?userId=` | `?artistId=` | `?genre=`
pub async fn list_subscriptions(
    State(state): State<SubscriptionsState>,
    Query(params): Query<IndexParams>,
) -> Result<Json<Vec<Subscription>>, AppError> {
    let store = state.subscriptions.store();
    let rows = match (params.user_id, params.artist_id, params.genre) {
        (Some(user_id), None, None) => store.by_user(&user_id).await?,
        (None, Some(artist_id), None) => store.by_artist(&artist_id).await?,
        (None, None, Some(genre)) => store.by_genre(&genre).await?,
        _ => {
            return Err(AppError::bad_request(
                "Exactly one of userId, artistId or genre is required",
            ));
        }
    };
    Ok(Json(rows))
}
