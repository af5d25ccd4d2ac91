//! Rating write path.
//!
//! A rating references a song owned by the catalog. The value is validated
//! first, then the song is probed through the breaker-guarded existence client,
//! then the row is upserted on `(song_id, user_id)`.

use std::sync::Arc;
use thiserror::Error;
use tunestream_core::environment::Clock;
use tunestream_core::{
    InvalidRating, Rating, RatingStore, RatingValue, RatingWrite, Reference, ReferenceCheck,
    StoreError,
};

/// Errors raised by [`RatingService`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RatingError {
    /// A required field was empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// The value is outside 1..=5.
    #[error(transparent)]
    Invalid(#[from] InvalidRating),

    /// The catalog says the song does not exist.
    #[error("Song not found: {0}")]
    SongNotFound(String),

    /// The catalog could not be asked (breaker open).
    #[error("Content service temporarily unavailable")]
    Unavailable,

    /// No rating to delete.
    #[error("Rating not found")]
    NotFound,

    /// Any other store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates, updates, reads and deletes ratings.
#[derive(Clone)]
pub struct RatingService {
    store: Arc<dyn RatingStore>,
    songs: Arc<dyn ReferenceCheck>,
    clock: Arc<dyn Clock>,
}

impl RatingService {
    /// Create a service writing to `store`, validating song ids with `songs`
    /// and stamping rows with `clock`.
    #[must_use]
    pub fn new(
        store: Arc<dyn RatingStore>,
        songs: Arc<dyn ReferenceCheck>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, songs, clock }
    }

    /// Rate `song_id` for `user_id`, replacing any earlier rating.
    ///
    /// # Errors
    ///
    /// [`RatingError::Invalid`] for values outside 1..=5,
    /// [`RatingError::SongNotFound`] if the song does not exist and
    /// [`RatingError::Unavailable`] if the catalog breaker is open.
    pub async fn rate(&self, song_id: &str, user_id: &str, value: i64) -> Result<RatingWrite, RatingError> {
        require("songId", song_id)?;
        require("userId", user_id)?;
        let value = RatingValue::try_from(value)?;

        match self.songs.check(song_id).await {
            Reference::Exists => {}
            Reference::Missing => return Err(RatingError::SongNotFound(song_id.to_owned())),
            Reference::Unavailable => {
                tracing::warn!(song_id = %song_id, user_id = %user_id, "Song check short-circuited by open breaker");
                return Err(RatingError::Unavailable);
            }
        }

        let write = self
            .store
            .upsert(Rating {
                song_id: song_id.to_owned(),
                user_id: user_id.to_owned(),
                value,
                updated_at: self.clock.now(),
            })
            .await?;
        tracing::info!(
            song_id = %song_id,
            user_id = %user_id,
            rating = %value,
            updated = matches!(write, RatingWrite::Updated(_)),
            "Rating saved"
        );
        Ok(write)
    }

    /// Delete the rating of `song_id` by `user_id`.
    ///
    /// # Errors
    ///
    /// [`RatingError::NotFound`] if there is none.
    pub async fn remove(&self, song_id: &str, user_id: &str) -> Result<(), RatingError> {
        require("songId", song_id)?;
        require("userId", user_id)?;
        match self.store.remove(song_id, user_id).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound(_)) => Err(RatingError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// The rating of `song_id` by `user_id`, if any.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn get(&self, song_id: &str, user_id: &str) -> Result<Option<Rating>, RatingError> {
        require("songId", song_id)?;
        require("userId", user_id)?;
        Ok(self.store.get(song_id, user_id).await?)
    }
}

fn require(field: &'static str, value: &str) -> Result<(), RatingError> {
    if value.trim().is_empty() {
        return Err(RatingError::MissingField(field));
    }
    Ok(())
}
