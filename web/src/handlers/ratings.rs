//! Ratings service handlers.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tunestream_core::{Rating, RatingWrite, RecommendationSet};

use crate::error::AppError;
use crate::state::RatingsState;

/// Query of `/rate-song`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateParams {
    song_id: Option<String>,
    user_id: Option<String>,
    rating: Option<i64>,
}

/// Query of `/delete-rating` and `/get-rating`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingKey {
    song_id: Option<String>,
    user_id: Option<String>,
}

/// Query of `/recommendations`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserParams {
    user_id: Option<String>,
}

/// Body of `GET /get-rating`.
#[derive(Debug, Serialize)]
pub struct RatingValueResponse {
    /// The stored value, or `null`.
    pub rating: Option<u8>,
}

/// `POST /rate-song?songId=&userId=&rating=`
///
/// 201 on first rating, 200 when it replaces an earlier one. 422 for values
/// outside 1..=5, 404 for an unknown song, 503 when the catalog breaker is
/// open.
pub async fn rate_song(
    State(state): State<RatingsState>,
    Query(params): Query<RateParams>,
) -> Result<(StatusCode, Json<Rating>), AppError> {
    let value = params
        .rating
        .ok_or_else(|| AppError::validation("rating is required"))?;
    let write = state
        .ratings
        .rate(
            params.song_id.as_deref().unwrap_or_default(),
            params.user_id.as_deref().unwrap_or_default(),
            value,
        )
        .await?;

    Ok(match write {
        RatingWrite::Created(rating) => (StatusCode::CREATED, Json(rating)),
        RatingWrite::Updated(rating) => (StatusCode::OK, Json(rating)),
    })
}

/// `DELETE /delete-rating?songId=&userId=`
pub async fn delete_rating(
    State(state): State<RatingsState>,
    Query(params): Query<RatingKey>,
) -> Result<StatusCode, AppError> {
    state
        .ratings
        .remove(
            params.song_id.as_deref().unwrap_or_default(),
            params.user_id.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /get-rating?songId=&userId=` → `{"rating": n | null}`
pub async fn get_rating(
    State(state): State<RatingsState>,
    Query(params): Query<RatingKey>,
) -> Result<Json<RatingValueResponse>, AppError> {
    let rating = state
        .ratings
        .get(
            params.song_id.as_deref().unwrap_or_default(),
            params.user_id.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(RatingValueResponse {
        rating: rating.map(|r| r.value.get()),
    }))
}

/// `GET /recommendations?userId=`
///
/// ```json
/// { "subscribedGenreSongs": [...], "topRatedSong": { ... } }
/// ```
pub async fn recommendations(
    State(state): State<RatingsState>,
    Query(params): Query<UserParams>,
) -> Result<Json<RecommendationSet>, AppError> {
    let user_id = params
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::validation("userId is required"))?;
    Ok(Json(state.recommendations.recommend(&user_id).await?))
}
