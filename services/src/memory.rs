//! In-memory stores.
//!
//! Each service process owns one of these for the data it is authoritative for.
//! They implement the store traits from `tunestream-core` and are also what the
//! integration tests wire together.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tunestream_core::{
    Album, Artist, CatalogReader, CatalogStore, Notification, NotificationStore, Rating,
    RatingStore, RatingValue, RatingWrite, Song, StoreError, StoreFuture, Subscription,
    SubscriptionDirectory, SubscriptionKind, SubscriptionStore, SubscriptionTarget,
};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
}

/// Subscriptions keyed by id, with a linear scan per index lookup.
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionStore {
    rows: Arc<RwLock<BTreeMap<String, Subscription>>>,
}

impl InMemorySubscriptionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn select(
        &self,
        predicate: impl Fn(&Subscription) -> bool,
    ) -> Result<Vec<Subscription>, StoreError> {
        Ok(read(&self.rows)?
            .values()
            .filter(|s| predicate(s))
            .cloned()
            .collect())
    }
}

impl SubscriptionDirectory for InMemorySubscriptionStore {
    fn by_user<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Vec<Subscription>> {
        Box::pin(async move { self.select(|s| s.user_id == user_id) })
    }

    fn by_artist<'a>(&'a self, artist_id: &'a str) -> StoreFuture<'a, Vec<Subscription>> {
        Box::pin(async move {
            self.select(|s| s.kind() == SubscriptionKind::Artist && s.target.value() == artist_id)
        })
    }

    fn by_genre<'a>(&'a self, genre: &'a str) -> StoreFuture<'a, Vec<Subscription>> {
        Box::pin(async move {
            self.select(|s| s.kind() == SubscriptionKind::Genre && s.target.value() == genre)
        })
    }
}

impl SubscriptionStore for InMemorySubscriptionStore {
    fn find<'a>(
        &'a self,
        user_id: &'a str,
        target: &'a SubscriptionTarget,
    ) -> StoreFuture<'a, Option<Subscription>> {
        Box::pin(async move {
            Ok(read(&self.rows)?
                .values()
                .find(|s| s.user_id == user_id && &s.target == target)
                .cloned())
        })
    }

    fn insert(&self, subscription: Subscription) -> StoreFuture<'_, Subscription> {
        Box::pin(async move {
            let mut rows = write(&self.rows)?;
            let duplicate = rows.values().any(|s| {
                s.id == subscription.id
                    || (s.user_id == subscription.user_id && s.target == subscription.target)
            });
            if duplicate {
                return Err(StoreError::Duplicate(format!(
                    "{}/{}/{}",
                    subscription.user_id,
                    subscription.kind(),
                    subscription.target.value()
                )));
            }
            rows.insert(subscription.id.clone(), subscription.clone());
            Ok(subscription)
        })
    }

    fn remove<'a>(
        &'a self,
        user_id: &'a str,
        target: &'a SubscriptionTarget,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut rows = write(&self.rows)?;
            let id = rows
                .values()
                .find(|s| s.user_id == user_id && &s.target == target)
                .map(|s| s.id.clone())
                .ok_or_else(|| {
                    StoreError::NotFound(format!("{user_id}/{}/{}", target.kind(), target.value()))
                })?;
            rows.remove(&id);
            Ok(())
        })
    }
}

/// Ratings keyed by `(song_id, user_id)`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRatingStore {
    rows: Arc<RwLock<HashMap<(String, String), Rating>>>,
}

impl InMemoryRatingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RatingStore for InMemoryRatingStore {
    fn upsert(&self, rating: Rating) -> StoreFuture<'_, RatingWrite> {
        Box::pin(async move {
            let key = (rating.song_id.clone(), rating.user_id.clone());
            let previous = write(&self.rows)?.insert(key, rating.clone());
            Ok(match previous {
                Some(_) => RatingWrite::Updated(rating),
                None => RatingWrite::Created(rating),
            })
        })
    }

    fn get<'a>(&'a self, song_id: &'a str, user_id: &'a str) -> StoreFuture<'a, Option<Rating>> {
        Box::pin(async move {
            Ok(read(&self.rows)?
                .get(&(song_id.to_owned(), user_id.to_owned()))
                .cloned())
        })
    }

    fn remove<'a>(&'a self, song_id: &'a str, user_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            write(&self.rows)?
                .remove(&(song_id.to_owned(), user_id.to_owned()))
                .map(|_| ())
                .ok_or_else(|| StoreError::NotFound(format!("rating {song_id}/{user_id}")))
        })
    }

    fn by_user<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Vec<Rating>> {
        Box::pin(async move {
            Ok(read(&self.rows)?
                .values()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect())
        })
    }

    fn five_star_counts(&self) -> StoreFuture<'_, HashMap<String, u64>> {
        Box::pin(async move {
            let rows = read(&self.rows)?;
            let mut counts: HashMap<String, u64> = HashMap::new();
            for rating in rows.values().filter(|r| r.value == RatingValue::FIVE_STARS) {
                *counts.entry(rating.song_id.clone()).or_default() += 1;
            }
            Ok(counts)
        })
    }
}

#[derive(Debug, Default)]
struct Catalog {
    artists: BTreeMap<String, Artist>,
    albums: BTreeMap<String, Album>,
    songs: BTreeMap<String, Song>,
}

/// Artists, albums and songs, each ordered by id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    inner: Arc<RwLock<Catalog>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn insert_unique<T: Clone>(
    map: &mut BTreeMap<String, T>,
    what: &str,
    id: &str,
    record: T,
) -> Result<T, StoreError> {
    if map.contains_key(id) {
        return Err(StoreError::Duplicate(format!("{what} {id}")));
    }
    map.insert(id.to_owned(), record.clone());
    Ok(record)
}

impl CatalogReader for InMemoryCatalog {
    fn songs(&self) -> StoreFuture<'_, Vec<Song>> {
        Box::pin(async move { Ok(read(&self.inner)?.songs.values().cloned().collect()) })
    }
}

impl CatalogStore for InMemoryCatalog {
    fn insert_artist(&self, artist: Artist) -> StoreFuture<'_, Artist> {
        Box::pin(async move {
            let id = artist.id.clone();
            insert_unique(&mut write(&self.inner)?.artists, "artist", &id, artist)
        })
    }

    fn insert_album(&self, album: Album) -> StoreFuture<'_, Album> {
        Box::pin(async move {
            let id = album.id.clone();
            insert_unique(&mut write(&self.inner)?.albums, "album", &id, album)
        })
    }

    fn insert_song(&self, song: Song) -> StoreFuture<'_, Song> {
        Box::pin(async move {
            let id = song.id.clone();
            insert_unique(&mut write(&self.inner)?.songs, "song", &id, song)
        })
    }

    fn artist<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Artist>> {
        Box::pin(async move { Ok(read(&self.inner)?.artists.get(id).cloned()) })
    }

    fn album<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Album>> {
        Box::pin(async move { Ok(read(&self.inner)?.albums.get(id).cloned()) })
    }

    fn song<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Song>> {
        Box::pin(async move { Ok(read(&self.inner)?.songs.get(id).cloned()) })
    }
}

/// Notifications in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationStore {
    rows: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryNotificationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored notifications.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the lock is poisoned.
    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(read(&self.rows)?.len())
    }
}

impl NotificationStore for InMemoryNotificationStore {
    fn insert(&self, notification: Notification) -> StoreFuture<'_, Notification> {
        Box::pin(async move {
            write(&self.rows)?.push(notification.clone());
            Ok(notification)
        })
    }

    fn by_user<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Vec<Notification>> {
        Box::pin(async move {
            let rows = read(&self.rows)?;
            let mut mine: Vec<Notification> = rows
                .iter()
                .rev()
                .filter(|n| n.user_id == user_id)
                .cloned()
                .collect();
            // Stable sort keeps insertion order (newest first) for equal timestamps
            mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(mine)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tunestream_testing::fixtures;

    #[tokio::test]
    async fn subscription_uniqueness_is_per_user_and_target() {
        let store = InMemorySubscriptionStore::new();
        store
            .insert(fixtures::subscription("1", "u1", SubscriptionTarget::genre("Rock")))
            .await
            .unwrap();

        let err = store
            .insert(fixtures::subscription("2", "u1", SubscriptionTarget::genre("Rock")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        // Same value, other kind or other user, is fine
        store
            .insert(fixtures::subscription("3", "u1", SubscriptionTarget::artist("Rock")))
            .await
            .unwrap();
        store
            .insert(fixtures::subscription("4", "u2", SubscriptionTarget::genre("Rock")))
            .await
            .unwrap();

        assert_eq!(store.by_genre("Rock").await.unwrap().len(), 2);
        assert_eq!(store.by_artist("Rock").await.unwrap().len(), 1);
        assert_eq!(store.by_user("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn subscription_remove_missing_is_not_found() {
        let store = InMemorySubscriptionStore::new();
        let target = SubscriptionTarget::artist("a1");
        assert!(matches!(
            store.remove("u1", &target).await,
            Err(StoreError::NotFound(_))
        ));

        store
            .insert(fixtures::subscription("1", "u1", target.clone()))
            .await
            .unwrap();
        store.remove("u1", &target).await.unwrap();
        assert!(store.find("u1", &target).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rating_upsert_updates_in_place() {
        let store = InMemoryRatingStore::new();
        let two = RatingValue::try_from(2).unwrap();

        let first = store.upsert(fixtures::rating("s1", "u1", two)).await.unwrap();
        assert!(matches!(first, RatingWrite::Created(_)));

        let second = store
            .upsert(fixtures::rating("s1", "u1", RatingValue::FIVE_STARS))
            .await
            .unwrap();
        assert!(matches!(second, RatingWrite::Updated(_)));

        assert_eq!(store.by_user("u1").await.unwrap().len(), 1);
        assert_eq!(
            store.get("s1", "u1").await.unwrap().unwrap().value,
            RatingValue::FIVE_STARS
        );
    }

    #[tokio::test]
    async fn five_star_counts_only_count_fives() {
        let store = InMemoryRatingStore::new();
        let four = RatingValue::try_from(4).unwrap();
        for (song, user, value) in [
            ("s1", "u1", RatingValue::FIVE_STARS),
            ("s1", "u2", RatingValue::FIVE_STARS),
            ("s2", "u1", four),
        ] {
            store.upsert(fixtures::rating(song, user, value)).await.unwrap();
        }

        let counts = store.five_star_counts().await.unwrap();
        assert_eq!(counts.get("s1"), Some(&2));
        assert_eq!(counts.get("s2"), None);
    }

    #[tokio::test]
    async fn catalog_rejects_duplicate_ids() {
        let catalog = InMemoryCatalog::new();
        catalog.insert_song(fixtures::song("s1", "Rock")).await.unwrap();
        assert!(matches!(
            catalog.insert_song(fixtures::song("s1", "Jazz")).await,
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(catalog.song("s1").await.unwrap().unwrap().genre, "Rock");
    }

    #[tokio::test]
    async fn notifications_newest_first() {
        let store = InMemoryNotificationStore::new();
        let earlier = Utc::now() - chrono::Duration::minutes(5);
        for (id, at) in [("n1", earlier), ("n2", Utc::now())] {
            store
                .insert(Notification {
                    id: id.into(),
                    user_id: "u1".into(),
                    kind: "new_song".into(),
                    message: "m".into(),
                    content_id: "s1".into(),
                    read: false,
                    created_at: at,
                })
                .await
                .unwrap();
        }
        let ids: Vec<_> = store
            .by_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, ["n2", "n1"]);
        assert_eq!(store.count().unwrap(), 2);
    }
}
