//! Catalog service handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tunestream_core::{Album, Artist, Song};
use tunestream_services::{CreateAlbum, CreateArtist, CreateSong};

use crate::error::AppError;
use crate::state::CatalogState;

/// Query of `/songs/exists`.
#[derive(Debug, Deserialize)]
pub struct ExistsParams {
    id: Option<String>,
}

/// Body of `GET /songs/exists`.
#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    /// Whether the song exists.
    pub exists: bool,
}

/// `POST /artists` → 201; publishes `new_artist`.
pub async fn create_artist(
    State(state): State<CatalogState>,
    Json(request): Json<CreateArtist>,
) -> Result<(StatusCode, Json<Artist>), AppError> {
    let artist = state.catalog.create_artist(request).await?;
    Ok((StatusCode::CREATED, Json(artist)))
}

/// `POST /albums` → 201; publishes `new_album`.
pub async fn create_album(
    State(state): State<CatalogState>,
    Json(request): Json<CreateAlbum>,
) -> Result<(StatusCode, Json<Album>), AppError> {
    let album = state.catalog.create_album(request).await?;
    Ok((StatusCode::CREATED, Json(album)))
}

/// `POST /songs` → 201; publishes `new_song`. 400 if the album does not exist.
pub async fn create_song(
    State(state): State<CatalogState>,
    Json(request): Json<CreateSong>,
) -> Result<(StatusCode, Json<Song>), AppError> {
    let song = state.catalog.create_song(request).await?;
    Ok((StatusCode::CREATED, Json(song)))
}

/// `GET /artists/:id`; also the artist existence probe (200 = exists).
pub async fn get_artist(
    State(state): State<CatalogState>,
    Path(id): Path<String>,
) -> Result<Json<Artist>, AppError> {
    Ok(Json(state.catalog.artist(&id).await?))
}

/// `GET /albums/:id`
pub async fn get_album(
    State(state): State<CatalogState>,
    Path(id): Path<String>,
) -> Result<Json<Album>, AppError> {
    Ok(Json(state.catalog.album(&id).await?))
}

/// `GET /songs`
pub async fn list_songs(State(state): State<CatalogState>) -> Result<Json<Vec<Song>>, AppError> {
    Ok(Json(state.catalog.songs().await?))
}

/// `GET /songs/:id`
pub async fn get_song(
    State(state): State<CatalogState>,
    Path(id): Path<String>,
) -> Result<Json<Song>, AppError> {
    Ok(Json(state.catalog.song(&id).await?))
}

/// `GET /songs/exists?id=` → `{"exists": bool}`; the song existence probe.
pub async fn song_exists(
    State(state): State<CatalogState>,
    Query(params): Query<ExistsParams>,
) -> Result<Json<ExistsResponse>, AppError> {
    let id = params
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("id is required"))?;
    Ok(Json(ExistsResponse {
        exists: state.catalog.song_exists(&id).await?,
    }))
}
