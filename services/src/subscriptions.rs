//! Subscription write path.
//!
//! Artist subscriptions reference an artist owned by the catalog, so creation
//! runs three steps in order: duplicate check, existence probe, insert. A
//! breaker-open probe is reported as [`SubscriptionError::Unavailable`] and a
//! genuine miss as [`SubscriptionError::ArtistNotFound`]; callers map them to
//! different statuses.

use std::sync::Arc;
use thiserror::Error;
use tunestream_core::environment::Clock;
use tunestream_core::{
    Reference, ReferenceCheck, StoreError, Subscription, SubscriptionStore, SubscriptionTarget,
};
use uuid::Uuid;

/// Errors raised by [`SubscriptionService`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// A required field was empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// The user already follows this target.
    #[error("Already subscribed to {kind} {value}")]
    Duplicate {
        /// `artist` or `genre`.
        kind: &'static str,
        /// Artist id or genre name.
        value: String,
    },

    /// The catalog says the artist does not exist.
    #[error("Artist not found: {0}")]
    ArtistNotFound(String),

    /// The catalog could not be asked (breaker open).
    #[error("Content service temporarily unavailable")]
    Unavailable,

    /// Nothing to unsubscribe from.
    #[error("Subscription not found")]
    NotFound,

    /// Any other store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates, removes and lists subscriptions.
#[derive(Clone)]
pub struct SubscriptionService {
    store: Arc<dyn SubscriptionStore>,
    artists: Arc<dyn ReferenceCheck>,
    clock: Arc<dyn Clock>,
}

impl SubscriptionService {
    /// Create a service writing to `store`, validating artist ids with `artists`.
    #[must_use]
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        artists: Arc<dyn ReferenceCheck>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            artists,
            clock,
        }
    }

    /// The underlying store, for index reads.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    /// Follow an artist.
    ///
    /// # Errors
    ///
    /// [`SubscriptionError::Duplicate`] if already followed,
    /// [`SubscriptionError::ArtistNotFound`] if the catalog has no such artist,
    /// [`SubscriptionError::Unavailable`] if the catalog breaker is open.
    pub async fn subscribe_artist(
        &self,
        user_id: &str,
        artist_id: &str,
    ) -> Result<Subscription, SubscriptionError> {
        require("userId", user_id)?;
        require("artistId", artist_id)?;
        let target = SubscriptionTarget::artist(artist_id);
        self.ensure_new(user_id, &target).await?;

        match self.artists.check(artist_id).await {
            Reference::Exists => {}
            Reference::Missing => {
                return Err(SubscriptionError::ArtistNotFound(artist_id.to_owned()));
            }
            Reference::Unavailable => {
                tracing::warn!(user_id = %user_id, artist_id = %artist_id, "Artist check short-circuited by open breaker");
                return Err(SubscriptionError::Unavailable);
            }
        }

        self.create(user_id, target).await
    }

    /// Follow a genre. Genres are free-form, there is nothing to probe.
    ///
    /// # Errors
    ///
    /// [`SubscriptionError::Duplicate`] if already followed.
    pub async fn subscribe_genre(
        &self,
        user_id: &str,
        genre: &str,
    ) -> Result<Subscription, SubscriptionError> {
        require("userId", user_id)?;
        require("genre", genre)?;
        let target = SubscriptionTarget::genre(genre);
        self.ensure_new(user_id, &target).await?;
        self.create(user_id, target).await
    }

    /// Stop following `target`.
    ///
    /// # Errors
    ///
    /// [`SubscriptionError::NotFound`] if there is no such subscription.
    pub async fn unsubscribe(
        &self,
        user_id: &str,
        target: &SubscriptionTarget,
    ) -> Result<(), SubscriptionError> {
        require("userId", user_id)?;
        require(target.kind().as_str(), target.value())?;
        match self.store.remove(user_id, target).await {
            Ok(()) => {
                tracing::info!(user_id = %user_id, kind = %target.kind(), value = %target.value(), "Subscription removed");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Err(SubscriptionError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_new(
        &self,
        user_id: &str,
        target: &SubscriptionTarget,
    ) -> Result<(), SubscriptionError> {
        if self.store.find(user_id, target).await?.is_some() {
            return Err(duplicate(target));
        }
        Ok(())
    }

    async fn create(
        &self,
        user_id: &str,
        target: SubscriptionTarget,
    ) -> Result<Subscription, SubscriptionError> {
        let conflict = duplicate(&target);
        let subscription = Subscription {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_owned(),
            target,
            created_at: self.clock.now(),
        };

        // The pre-check can race a concurrent insert; the store has the last word
        match self.store.insert(subscription).await {
            Ok(created) => {
                tracing::info!(
                    subscription_id = %created.id,
                    user_id = %created.user_id,
                    kind = %created.kind(),
                    value = %created.target.value(),
                    "Subscription created"
                );
                Ok(created)
            }
            Err(StoreError::Duplicate(_)) => Err(conflict),
            Err(e) => Err(e.into()),
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), SubscriptionError> {
    if value.trim().is_empty() {
        return Err(SubscriptionError::MissingField(field));
    }
    Ok(())
}

fn duplicate(target: &SubscriptionTarget) -> SubscriptionError {
    SubscriptionError::Duplicate {
        kind: target.kind().as_str(),
        value: target.value().to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::memory::InMemorySubscriptionStore;
    use tunestream_core::SubscriptionDirectory;
    use tunestream_testing::mocks::{ScriptedReferences, test_clock};

    fn service(refs: ScriptedReferences) -> (SubscriptionService, Arc<InMemorySubscriptionStore>, Arc<ScriptedReferences>) {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let refs = Arc::new(refs);
        let svc = SubscriptionService::new(store.clone(), refs.clone(), Arc::new(test_clock()));
        (svc, store, refs)
    }

    #[tokio::test]
    async fn artist_subscription_is_indexed_both_ways() {
        let (svc, store, _) = service(ScriptedReferences::new().with("a1", Reference::Exists));

        let created = svc.subscribe_artist("u1", "a1").await.unwrap();
        assert_eq!(created.target, SubscriptionTarget::artist("a1"));
        assert_eq!(created.created_at, test_clock().now());

        assert_eq!(store.by_user("u1").await.unwrap(), [created.clone()]);
        assert_eq!(store.by_artist("a1").await.unwrap(), [created]);
    }

    #[tokio::test]
    async fn duplicate_is_rejected_before_probing() {
        let (svc, _, refs) = service(ScriptedReferences::new().with("a1", Reference::Exists));
        svc.subscribe_artist("u1", "a1").await.unwrap();

        let err = svc.subscribe_artist("u1", "a1").await.unwrap_err();
        assert_eq!(
            err,
            SubscriptionError::Duplicate {
                kind: "artist",
                value: "a1".into()
            }
        );
        assert_eq!(refs.asked(), ["a1"]);
    }

    #[tokio::test]
    async fn missing_and_unavailable_artists_are_distinct() {
        let (svc, store, _) = service(ScriptedReferences::new().with("down", Reference::Unavailable));

        assert_eq!(
            svc.subscribe_artist("u1", "ghost").await.unwrap_err(),
            SubscriptionError::ArtistNotFound("ghost".into())
        );
        assert_eq!(
            svc.subscribe_artist("u1", "down").await.unwrap_err(),
            SubscriptionError::Unavailable
        );
        assert!(store.by_user("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn genre_subscribe_and_unsubscribe() {
        let (svc, store, refs) = service(ScriptedReferences::new());

        svc.subscribe_genre("u1", "Jazz").await.unwrap();
        assert_eq!(store.by_genre("Jazz").await.unwrap().len(), 1);
        assert!(refs.asked().is_empty());

        let target = SubscriptionTarget::genre("Jazz");
        svc.unsubscribe("u1", &target).await.unwrap();
        assert_eq!(svc.unsubscribe("u1", &target).await.unwrap_err(), SubscriptionError::NotFound);
    }

    #[tokio::test]
    async fn blank_fields_are_rejected() {
        let (svc, _, _) = service(ScriptedReferences::new());
        assert_eq!(
            svc.subscribe_genre(" ", "Jazz").await.unwrap_err(),
            SubscriptionError::MissingField("userId")
        );
        assert_eq!(
            svc.subscribe_artist("u1", "").await.unwrap_err(),
            SubscriptionError::MissingField("artistId")
        );
    }
}
