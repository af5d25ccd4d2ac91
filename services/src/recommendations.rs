//! Recommendation aggregator.
//!
//! Blends three independently owned sources into a [`RecommendationSet`]:
//!
//! 1. the user's genre subscriptions (`G`),
//! 2. the user's ratings, of which the songs rated below 4 form the exclusion
//!    set `E`,
//! 3. the catalog, joined against the per-song five-star counts.
//!
//! `subscribedGenreSongs` is every catalog song with genre in `G` and id not in
//! `E`. `topRatedSong` is the song with the most five-star ratings among the
//! genres outside `G`; ties go to the lowest song id.
//!
//! The sources are read one after the other with no transaction between them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tunestream_core::{
    CatalogReader, RatingStore, RecommendationSet, Song, SongRecommendation, StoreError,
    SubscriptionDirectory, SubscriptionKind,
};

/// Reason attached to songs from subscribed genres.
pub const SUBSCRIBED_GENRE_REASON: &str = "Based on your genre subscriptions";

/// Reason attached to the top song from an unsubscribed genre.
pub const TOP_RATED_REASON: &str = "Popular in genre you might like";

/// Ratings below this value exclude a song from the subscribed-genre list.
pub const LIKED_THRESHOLD: u8 = 4;

/// Read-only recommendation query over subscriptions, ratings and catalog.
#[derive(Clone)]
pub struct RecommendationAggregator {
    subscriptions: Arc<dyn SubscriptionDirectory>,
    ratings: Arc<dyn RatingStore>,
    catalog: Arc<dyn CatalogReader>,
}

impl RecommendationAggregator {
    /// Create an aggregator over the three sources.
    #[must_use]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionDirectory>,
        ratings: Arc<dyn RatingStore>,
        catalog: Arc<dyn CatalogReader>,
    ) -> Self {
        Self {
            subscriptions,
            ratings,
            catalog,
        }
    }

    /// Compute recommendations for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`] raised by any of the sources.
    pub async fn recommend(&self, user_id: &str) -> Result<RecommendationSet, StoreError> {
        let genres: HashSet<String> = self
            .subscriptions
            .by_user(user_id)
            .await?
            .into_iter()
            .filter(|s| s.kind() == SubscriptionKind::Genre)
            .map(|s| s.target.value().to_owned())
            .collect();

        let disliked: HashSet<String> = self
            .ratings
            .by_user(user_id)
            .await?
            .into_iter()
            .filter(|r| r.value.get() < LIKED_THRESHOLD)
            .map(|r| r.song_id)
            .collect();

        let songs = self.catalog.songs().await?;

        let subscribed_genre_songs = if genres.is_empty() {
            Vec::new()
        } else {
            songs
                .iter()
                .filter(|song| genres.contains(&song.genre) && !disliked.contains(&song.id))
                .map(|song| SongRecommendation::from_song(song, SUBSCRIBED_GENRE_REASON))
                .collect()
        };

        let five_stars = self.ratings.five_star_counts().await?;
        let top_rated_unsubscribed_genre_song =
            top_rated(&songs, &genres, &five_stars).map(|song| SongRecommendation::from_song(song, TOP_RATED_REASON));

        tracing::debug!(
            user_id = %user_id,
            subscribed_genres = genres.len(),
            excluded = disliked.len(),
            subscribed_genre_songs = subscribed_genre_songs.len(),
            has_top_rated = top_rated_unsubscribed_genre_song.is_some(),
            "Recommendations computed"
        );

        Ok(RecommendationSet {
            subscribed_genre_songs,
            top_rated_unsubscribed_genre_song,
        })
    }
}

/// Most five-starred song outside `subscribed`. Songs with no five-star rating
/// still qualify; `None` only when no song lies outside `subscribed`.
fn top_rated<'a>(
    songs: &'a [Song],
    subscribed: &HashSet<String>,
    five_stars: &HashMap<String, u64>,
) -> Option<&'a Song> {
    let mut best: Option<(&Song, u64)> = None;
    for song in songs.iter().filter(|s| !subscribed.contains(&s.genre)) {
        let count = five_stars.get(&song.id).copied().unwrap_or(0);
        let better = match best {
            None => true,
            Some((current, current_count)) => {
                count > current_count || (count == current_count && song.id < current.id)
            }
        };
        if better {
            best = Some((song, count));
        }
    }
    best.map(|(song, _)| song)
}
