//! Storage traits, one per logically separate store.
//!
//! Subscriptions, ratings, the catalog and notifications are owned by different
//! services. Nothing here spans more than one store, so there are no cross-store
//! transactions; readers that combine stores get a best-effort snapshot.
//!
//! # Implementations
//!
//! - In-memory stores (in `tunestream-services`): used by the services and tests
//! - Remote readers (in `tunestream-clients`): [`CatalogReader`] and
//!   [`SubscriptionDirectory`] over HTTP, for services that do not own the data
//!
//! # Dyn Compatibility
//!
//! All methods return boxed futures so the traits can be used as
//! `Arc<dyn SubscriptionStore>` and friends.

use crate::model::{
    Album, Artist, Notification, Rating, Song, Subscription, SubscriptionTarget,
};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by every store method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A record with the same unique key already exists.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// The record to update or delete does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure.
    #[error("Store error: {0}")]
    Backend(String),
}

/// Read side of the subscription store: the indexes used by fan-out and
/// recommendations.
pub trait SubscriptionDirectory: Send + Sync {
    /// All subscriptions of a user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn by_user<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Vec<Subscription>>;

    /// All artist subscriptions for `artist_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn by_artist<'a>(&'a self, artist_id: &'a str) -> StoreFuture<'a, Vec<Subscription>>;

    /// All genre subscriptions for `genre`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn by_genre<'a>(&'a self, genre: &'a str) -> StoreFuture<'a, Vec<Subscription>>;
}

/// Full subscription store owned by the subscriptions service.
pub trait SubscriptionStore: SubscriptionDirectory {
    /// The subscription of `user_id` to `target`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn find<'a>(
        &'a self,
        user_id: &'a str,
        target: &'a SubscriptionTarget,
    ) -> StoreFuture<'a, Option<Subscription>>;

    /// Create a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if `(user_id, target)` already exists.
    fn insert(&self, subscription: Subscription) -> StoreFuture<'_, Subscription>;

    /// Delete a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is nothing to delete.
    fn remove<'a>(&'a self, user_id: &'a str, target: &'a SubscriptionTarget)
    -> StoreFuture<'a, ()>;
}

/// Outcome of [`RatingStore::upsert`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RatingWrite {
    /// No rating existed; a new row was inserted.
    Created(Rating),
    /// The existing row was updated in place.
    Updated(Rating),
}

impl RatingWrite {
    /// The stored rating.
    #[must_use]
    pub const fn rating(&self) -> &Rating {
        match self {
            Self::Created(r) | Self::Updated(r) => r,
        }
    }
}

/// Rating store owned by the ratings service. Keyed by `(song_id, user_id)`.
pub trait RatingStore: Send + Sync {
    /// Insert `rating`, replacing any earlier row for its `(song_id, user_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn upsert(&self, rating: Rating) -> StoreFuture<'_, RatingWrite>;

    /// The rating of `user_id` for `song_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn get<'a>(&'a self, song_id: &'a str, user_id: &'a str) -> StoreFuture<'a, Option<Rating>>;

    /// Delete a rating.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is nothing to delete.
    fn remove<'a>(&'a self, song_id: &'a str, user_id: &'a str) -> StoreFuture<'a, ()>;

    /// All ratings written by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn by_user<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Vec<Rating>>;

    /// Number of five-star ratings per song id. Songs without any are absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn five_star_counts(&self) -> StoreFuture<'_, HashMap<String, u64>>;
}

/// Read access to the song catalog.
pub trait CatalogReader: Send + Sync {
    /// Every song in the catalog, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the catalog cannot be read.
    fn songs(&self) -> StoreFuture<'_, Vec<Song>>;
}

/// Catalog store owned by the catalog service.
pub trait CatalogStore: CatalogReader {
    /// Store a new artist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if the id is taken.
    fn insert_artist(&self, artist: Artist) -> StoreFuture<'_, Artist>;

    /// Store a new album.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if the id is taken.
    fn insert_album(&self, album: Album) -> StoreFuture<'_, Album>;

    /// Store a new song.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if the id is taken.
    fn insert_song(&self, song: Song) -> StoreFuture<'_, Song>;

    /// Look up an artist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the catalog cannot be read.
    fn artist<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Artist>>;

    /// Look up an album.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the catalog cannot be read.
    fn album<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Album>>;

    /// Look up a song.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the catalog cannot be read.
    fn song<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Song>>;
}

/// Notification store owned by the notifications service.
pub trait NotificationStore: Send + Sync {
    /// Store a notification.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn insert(&self, notification: Notification) -> StoreFuture<'_, Notification>;

    /// Notifications of a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    fn by_user<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Vec<Notification>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RatingValue;
    use chrono::Utc;

    #[test]
    fn duplicate_error_display() {
        let error = StoreError::Duplicate("u1/artist/a1".to_string());
        assert_eq!(error.to_string(), "Duplicate record: u1/artist/a1");
    }

    #[test]
    fn rating_write_exposes_row() {
        let rating = Rating {
            song_id: "s1".into(),
            user_id: "u1".into(),
            value: RatingValue::FIVE_STARS,
            updated_at: Utc::now(),
        };
        assert_eq!(RatingWrite::Updated(rating.clone()).rating(), &rating);
        assert_eq!(RatingWrite::Created(rating.clone()).rating(), &rating);
    }
}
