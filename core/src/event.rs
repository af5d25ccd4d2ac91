//! Domain events emitted by the catalog and consumed by subscription fan-out.
//!
//! Events are immutable facts about newly created catalog content. On the wire they
//! are JSON objects discriminated by a `type` field:
//!
//! ```json
//! {"type": "new_artist", "artistId": "a1", "name": "Nova", "genres": ["Rock"]}
//! {"type": "new_album",  "albumId": "b1", "name": "First", "genre": "Rock", "artistIds": ["a1"]}
//! {"type": "new_song",   "songId": "s1", "name": "Intro", "genre": "Rock", "artistIds": ["a1"], "albumId": "b1"}
//! ```
//!
//! Decoding goes through [`DomainEvent::decode`], which rejects a missing or unknown
//! `type` explicitly instead of falling through.
//!
//! # Example
//!
//! ```
//! use tunestream_core::event::{DomainEvent, EventKind};
//!
//! let event = DomainEvent::decode(
//!     br#"{"type":"new_artist","artistId":"a1","name":"Nova","genres":["Rock","Rock"]}"#,
//! )?;
//! assert_eq!(event.kind(), EventKind::NewArtist);
//! assert_eq!(event.subject_id(), "a1");
//! # Ok::<(), tunestream_core::event::EventError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Error types for event decoding.
#[derive(Error, Debug)]
pub enum EventError {
    /// Body is not a JSON object.
    #[error("Malformed event payload: {0}")]
    Malformed(String),

    /// The `type` discriminator is absent or not a string.
    #[error("Event payload has no type")]
    MissingType,

    /// The `type` discriminator names no known event.
    #[error("Unknown event type: {0}")]
    UnknownType(String),

    /// The subject id of the event is empty.
    #[error("Event {0} has an empty subject id")]
    EmptySubject(EventKind),

    /// Failed to serialize an event.
    #[error("Failed to serialize event: {0}")]
    Serialization(String),
}

/// Discriminator of a [`DomainEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new artist was created.
    NewArtist,
    /// A new album was created.
    NewAlbum,
    /// A new song was created.
    NewSong,
}

impl EventKind {
    /// All kinds, in wire order.
    pub const ALL: [Self; 3] = [Self::NewArtist, Self::NewAlbum, Self::NewSong];

    /// The wire tag, also used as the notification type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewArtist => "new_artist",
            Self::NewAlbum => "new_album",
            Self::NewSong => "new_song",
        }
    }

    /// Parse a wire tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `new_artist` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistCreated {
    /// Id of the new artist.
    pub artist_id: String,
    /// Artist name.
    pub name: String,
    /// Genres; duplicates collapse on decode.
    #[serde(default)]
    pub genres: BTreeSet<String>,
}

/// Payload of a `new_album` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumCreated {
    /// Id of the new album.
    pub album_id: String,
    /// Album title.
    pub name: String,
    /// Album genre.
    #[serde(default)]
    pub genre: String,
    /// Credited artists.
    #[serde(default)]
    pub artist_ids: BTreeSet<String>,
}

/// Payload of a `new_song` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongCreated {
    /// Id of the new song.
    pub song_id: String,
    /// Song title.
    pub name: String,
    /// Song genre.
    #[serde(default)]
    pub genre: String,
    /// Credited artists.
    #[serde(default)]
    pub artist_ids: BTreeSet<String>,
    /// Album the song belongs to.
    #[serde(default)]
    pub album_id: String,
}

/// A fact about new catalog content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// See [`ArtistCreated`].
    NewArtist(ArtistCreated),
    /// See [`AlbumCreated`].
    NewAlbum(AlbumCreated),
    /// See [`SongCreated`].
    NewSong(SongCreated),
}

impl DomainEvent {
    /// Discriminator.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::NewArtist(_) => EventKind::NewArtist,
            Self::NewAlbum(_) => EventKind::NewAlbum,
            Self::NewSong(_) => EventKind::NewSong,
        }
    }

    /// Id of the artist, album or song the event is about.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        match self {
            Self::NewArtist(e) => &e.artist_id,
            Self::NewAlbum(e) => &e.album_id,
            Self::NewSong(e) => &e.song_id,
        }
    }

    /// Display name of the subject.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::NewArtist(e) => &e.name,
            Self::NewAlbum(e) => &e.name,
            Self::NewSong(e) => &e.name,
        }
    }

    /// Decode and validate a wire payload.
    ///
    /// # Errors
    ///
    /// - [`EventError::Malformed`] if the body is not a JSON object or a field has
    ///   the wrong shape
    /// - [`EventError::MissingType`] / [`EventError::UnknownType`] for a bad
    ///   discriminator
    /// - [`EventError::EmptySubject`] if the subject id is empty
    pub fn decode(bytes: &[u8]) -> Result<Self, EventError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| EventError::Malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(EventError::Malformed("expected a JSON object".to_string()));
        }

        let tag = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(EventError::MissingType)?;
        let kind = EventKind::from_tag(tag).ok_or_else(|| EventError::UnknownType(tag.to_string()))?;

        let event: Self =
            serde_json::from_value(value).map_err(|e| EventError::Malformed(e.to_string()))?;
        if event.subject_id().trim().is_empty() {
            return Err(EventError::EmptySubject(kind));
        }
        Ok(event)
    }

    /// Encode to the wire format.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::Serialization(e.to_string()))
    }
}

/// Publishes domain events without blocking the caller.
///
/// Implementations must return immediately; delivery happens in the background
/// and is best effort (at most once, no retry).
pub trait EventPublisher: Send + Sync {
    /// Hand off `event` for delivery.
    fn publish(&self, event: DomainEvent);
}
