//! Catalog write path.
//!
//! Each create stores the record first and only then publishes the matching
//! [`DomainEvent`], so a published event always describes a committed record.
//! Publishing is fire-and-forget; a lost event leaves the record in place.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tunestream_core::event::{AlbumCreated, ArtistCreated, SongCreated};
use tunestream_core::{
    Album, Artist, CatalogStore, DomainEvent, EventPublisher, Song, StoreError,
};
use uuid::Uuid;

/// Errors raised by [`CatalogService`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A required field was empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A song referenced an album that does not exist.
    #[error("Album not found: {0}")]
    UnknownAlbum(String),

    /// Lookup by id found nothing.
    #[error("{what} not found: {id}")]
    NotFound {
        /// `artist`, `album` or `song`.
        what: &'static str,
        /// Requested id.
        id: String,
    },

    /// Any other store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Body of `POST /artists`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArtist {
    /// Display name.
    pub name: String,
    /// Free text biography.
    #[serde(default)]
    pub biography: String,
    /// Genres played.
    #[serde(default)]
    pub genres: BTreeSet<String>,
}

/// Body of `POST /albums`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlbum {
    /// Title.
    pub name: String,
    /// Genre.
    pub genre: String,
    /// Credited artists.
    #[serde(default)]
    pub artist_ids: BTreeSet<String>,
}

/// Body of `POST /songs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSong {
    /// Title.
    pub name: String,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: u32,
    /// Genre.
    pub genre: String,
    /// Album the song belongs to; must exist.
    pub album_id: String,
    /// Credited artists.
    #[serde(default)]
    pub artist_ids: BTreeSet<String>,
}

/// Catalog CRUD that announces new content.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    events: Arc<dyn EventPublisher>,
}

impl CatalogService {
    /// Create a service over `store`, announcing creations through `events`.
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, events }
    }

    /// Store a new artist and publish `new_artist`.
    ///
    /// # Errors
    ///
    /// [`CatalogError::MissingField`] for a blank name, or a store failure.
    pub async fn create_artist(&self, request: CreateArtist) -> Result<Artist, CatalogError> {
        require("name", &request.name)?;
        let artist = self
            .store
            .insert_artist(Artist {
                id: new_id(),
                name: request.name,
                biography: request.biography,
                genres: clean(request.genres),
            })
            .await?;

        tracing::info!(artist_id = %artist.id, name = %artist.name, "Artist created");
        self.events.publish(DomainEvent::NewArtist(ArtistCreated {
            artist_id: artist.id.clone(),
            name: artist.name.clone(),
            genres: artist.genres.clone(),
        }));
        Ok(artist)
    }

    /// Store a new album and publish `new_album`.
    ///
    /// # Errors
    ///
    /// [`CatalogError::MissingField`] for a blank name or genre, or a store
    /// failure.
    pub async fn create_album(&self, request: CreateAlbum) -> Result<Album, CatalogError> {
        require("name", &request.name)?;
        require("genre", &request.genre)?;
        let album = self
            .store
            .insert_album(Album {
                id: new_id(),
                name: request.name,
                genre: request.genre,
                artist_ids: clean(request.artist_ids),
            })
            .await?;

        tracing::info!(album_id = %album.id, name = %album.name, "Album created");
        self.events.publish(DomainEvent::NewAlbum(AlbumCreated {
            album_id: album.id.clone(),
            name: album.name.clone(),
            genre: album.genre.clone(),
            artist_ids: album.artist_ids.clone(),
        }));
        Ok(album)
    }

    /// Store a new song on an existing album and publish `new_song`.
    ///
    /// # Errors
    ///
    /// [`CatalogError::UnknownAlbum`] if the album does not exist,
    /// [`CatalogError::MissingField`] for blank fields, or a store failure.
    pub async fn create_song(&self, request: CreateSong) -> Result<Song, CatalogError> {
        require("name", &request.name)?;
        require("genre", &request.genre)?;
        require("albumId", &request.album_id)?;
        if self.store.album(&request.album_id).await?.is_none() {
            return Err(CatalogError::UnknownAlbum(request.album_id));
        }

        let song = self
            .store
            .insert_song(Song {
                id: new_id(),
                name: request.name,
                duration: request.duration,
                genre: request.genre,
                album_id: request.album_id,
                artist_ids: clean(request.artist_ids),
            })
            .await?;

        tracing::info!(song_id = %song.id, album_id = %song.album_id, name = %song.name, "Song created");
        self.events.publish(DomainEvent::NewSong(SongCreated {
            song_id: song.id.clone(),
            name: song.name.clone(),
            genre: song.genre.clone(),
            artist_ids: song.artist_ids.clone(),
            album_id: song.album_id.clone(),
        }));
        Ok(song)
    }

    /// Artist by id.
    ///
    /// # Errors
    ///
    /// [`CatalogError::NotFound`] if absent.
    pub async fn artist(&self, id: &str) -> Result<Artist, CatalogError> {
        self.store.artist(id).await?.ok_or_else(|| not_found("artist", id))
    }

    /// Album by id.
    ///
    /// # Errors
    ///
    /// [`CatalogError::NotFound`] if absent.
    pub async fn album(&self, id: &str) -> Result<Album, CatalogError> {
        self.store.album(id).await?.ok_or_else(|| not_found("album", id))
    }

    /// Song by id.
    ///
    /// # Errors
    ///
    /// [`CatalogError::NotFound`] if absent.
    pub async fn song(&self, id: &str) -> Result<Song, CatalogError> {
        self.store.song(id).await?.ok_or_else(|| not_found("song", id))
    }

    /// All songs ordered by id.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn songs(&self) -> Result<Vec<Song>, CatalogError> {
        Ok(self.store.songs().await?)
    }

    /// Whether a song with `id` exists; answers the existence probe.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn song_exists(&self, id: &str) -> Result<bool, CatalogError> {
        Ok(self.store.song(id).await?.is_some())
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn require(field: &'static str, value: &str) -> Result<(), CatalogError> {
    if value.trim().is_empty() {
        return Err(CatalogError::MissingField(field));
    }
    Ok(())
}

fn clean(values: BTreeSet<String>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .collect()
}

fn not_found(what: &'static str, id: &str) -> CatalogError {
    CatalogError::NotFound {
        what,
        id: id.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCatalog;
    use tunestream_testing::mocks::RecordingPublisher;

    fn service() -> (CatalogService, Arc<RecordingPublisher>) {
        let events = Arc::new(RecordingPublisher::new());
        (
            CatalogService::new(Arc::new(InMemoryCatalog::new()), events.clone()),
            events,
        )
    }

    fn genres(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[tokio::test]
    async fn artist_creation_publishes_after_store() {
        let (svc, events) = service();
        let artist = svc
            .create_artist(CreateArtist {
                name: "Nova".into(),
                biography: String::new(),
                genres: genres(&["Rock", " ", "Jazz"]),
            })
            .await
            .unwrap();

        assert_eq!(svc.artist(&artist.id).await.unwrap(), artist);
        let published = events.events();
        assert_eq!(published.len(), 1);
        let DomainEvent::NewArtist(payload) = &published[0] else {
            panic!("expected new_artist, got {:?}", published[0]);
        };
        assert_eq!(payload.artist_id, artist.id);
        assert_eq!(payload.genres, genres(&["Jazz", "Rock"]));
    }

    #[tokio::test]
    async fn song_requires_existing_album() {
        let (svc, events) = service();
        let err = svc
            .create_song(CreateSong {
                name: "Intro".into(),
                duration: 90,
                genre: "Rock".into(),
                album_id: "nope".into(),
                artist_ids: genres(&["a1"]),
            })
            .await
            .unwrap_err();

        assert_eq!(err, CatalogError::UnknownAlbum("nope".into()));
        assert!(events.events().is_empty());
    }

    #[tokio::test]
    async fn album_then_song_publish_in_order() {
        let (svc, events) = service();
        let album = svc
            .create_album(CreateAlbum {
                name: "First".into(),
                genre: "Rock".into(),
                artist_ids: genres(&["a1"]),
            })
            .await
            .unwrap();
        let song = svc
            .create_song(CreateSong {
                name: "Intro".into(),
                duration: 90,
                genre: "Rock".into(),
                album_id: album.id.clone(),
                artist_ids: genres(&["a1", "a2"]),
            })
            .await
            .unwrap();

        assert!(svc.song_exists(&song.id).await.unwrap());
        assert!(!svc.song_exists("other").await.unwrap());
        let kinds: Vec<_> = events.events().iter().map(|e| e.kind().as_str()).collect();
        assert_eq!(kinds, ["new_album", "new_song"]);
    }

    #[tokio::test]
    async fn missing_records_and_blank_fields() {
        let (svc, _) = service();
        assert_eq!(
            svc.song("s1").await.unwrap_err(),
            CatalogError::NotFound { what: "song", id: "s1".into() }
        );
        assert_eq!(
            svc.create_album(CreateAlbum {
                name: "X".into(),
                genre: String::new(),
                artist_ids: BTreeSet::new(),
            })
            .await
            .unwrap_err(),
            CatalogError::MissingField("genre")
        );
    }
}
