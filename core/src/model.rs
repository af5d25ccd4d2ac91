//! Records owned by the individual services.
//!
//! Field names follow the JSON shapes the services exchange (`camelCase`), so the
//! same types are used for storage, HTTP bodies and inter-service calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// What a subscription points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionKind {
    /// Follows a single artist.
    Artist,
    /// Follows a genre.
    Genre,
}

impl SubscriptionKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::Genre => "genre",
        }
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The target of a subscription. Exactly one of artist id or genre is carried,
/// selected by the kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SubscriptionTarget {
    /// Subscription to an artist.
    Artist {
        /// Catalog id of the artist.
        #[serde(rename = "artistId")]
        artist_id: String,
    },
    /// Subscription to a genre.
    Genre {
        /// Genre name, matched exactly.
        genre: String,
    },
}

impl SubscriptionTarget {
    /// Artist target.
    pub fn artist(artist_id: impl Into<String>) -> Self {
        Self::Artist {
            artist_id: artist_id.into(),
        }
    }

    /// Genre target.
    pub fn genre(genre: impl Into<String>) -> Self {
        Self::Genre {
            genre: genre.into(),
        }
    }

    /// The kind of this target.
    #[must_use]
    pub const fn kind(&self) -> SubscriptionKind {
        match self {
            Self::Artist { .. } => SubscriptionKind::Artist,
            Self::Genre { .. } => SubscriptionKind::Genre,
        }
    }

    /// The artist id or genre name.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Artist { artist_id } => artist_id,
            Self::Genre { genre } => genre,
        }
    }
}

/// A user's subscription to an artist or a genre.
///
/// `(user_id, target)` is unique across the subscription store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Store-assigned id.
    pub id: String,
    /// Subscriber.
    pub user_id: String,
    /// What is followed.
    #[serde(flatten)]
    pub target: SubscriptionTarget,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Shorthand for `self.target.kind()`.
    #[must_use]
    pub const fn kind(&self) -> SubscriptionKind {
        self.target.kind()
    }
}

/// Request to create a notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    /// Recipient.
    pub user_id: String,
    /// Notification type, e.g. `new_artist`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human readable message.
    pub message: String,
    /// Id of the artist, album or song that caused the notification.
    pub content_id: String,
}

/// A stored notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Store-assigned id.
    pub id: String,
    /// Recipient.
    pub user_id: String,
    /// Notification type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message text.
    pub message: String,
    /// Causing content id.
    pub content_id: String,
    /// Whether the user has seen it.
    #[serde(default)]
    pub read: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Materialize a request into a stored row (unread).
    #[must_use]
    pub fn from_request(id: String, request: NewNotification, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: request.user_id,
            kind: request.kind,
            message: request.message,
            content_id: request.content_id,
            read: false,
            created_at,
        }
    }
}

/// Rejected rating value.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("rating must be between 1 and 5, got {0}")]
pub struct InvalidRating(pub i64);

/// A rating value in `1..=5`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct RatingValue(u8);

impl RatingValue {
    /// Lowest accepted value.
    pub const MIN: u8 = 1;
    /// Highest accepted value.
    pub const MAX: u8 = 5;
    /// Five stars.
    pub const FIVE_STARS: Self = Self(5);

    /// The numeric value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for RatingValue {
    type Error = InvalidRating;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Self)
            .ok_or(InvalidRating(value))
    }
}

impl From<RatingValue> for u8 {
    fn from(value: RatingValue) -> Self {
        value.0
    }
}

impl fmt::Display for RatingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One user's rating of one song. At most one exists per `(song_id, user_id)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    /// Rated song.
    pub song_id: String,
    /// Rating user.
    pub user_id: String,
    /// The value.
    #[serde(rename = "rating")]
    pub value: RatingValue,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
}

/// A catalog artist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    /// Catalog id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free text biography.
    #[serde(default)]
    pub biography: String,
    /// Genres the artist plays.
    #[serde(default)]
    pub genres: BTreeSet<String>,
}

/// A catalog album.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    /// Catalog id.
    pub id: String,
    /// Title.
    pub name: String,
    /// Album genre.
    pub genre: String,
    /// Credited artists.
    #[serde(default)]
    pub artist_ids: BTreeSet<String>,
}

/// A catalog song.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    /// Catalog id.
    pub id: String,
    /// Title.
    pub name: String,
    /// Duration in seconds.
    pub duration: u32,
    /// Song genre.
    pub genre: String,
    /// Album the song belongs to.
    pub album_id: String,
    /// Credited artists.
    #[serde(default)]
    pub artist_ids: BTreeSet<String>,
}

/// A song suggested to a user, with the reason it was picked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRecommendation {
    /// Song id.
    pub song_id: String,
    /// Title.
    pub name: String,
    /// Genre.
    pub genre: String,
    /// Credited artists.
    pub artist_ids: BTreeSet<String>,
    /// Album.
    pub album_id: String,
    /// Duration in seconds.
    pub duration: u32,
    /// Why the song was picked.
    pub reason: String,
}

impl SongRecommendation {
    /// Build a recommendation from a catalog song.
    #[must_use]
    pub fn from_song(song: &Song, reason: &str) -> Self {
        Self {
            song_id: song.id.clone(),
            name: song.name.clone(),
            genre: song.genre.clone(),
            artist_ids: song.artist_ids.clone(),
            album_id: song.album_id.clone(),
            duration: song.duration,
            reason: reason.to_owned(),
        }
    }
}

/// Per-request recommendation result.
///
/// Field order is part of the response contract: `subscribedGenreSongs` first,
/// `topRatedSong` second (always present, `null` when nothing qualifies).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationSet {
    /// Songs from the user's subscribed genres, minus the ones they rated low.
    #[serde(rename = "subscribedGenreSongs")]
    pub subscribed_genre_songs: Vec<SongRecommendation>,
    /// Most five-starred song from a genre the user does not follow.
    #[serde(rename = "topRatedSong")]
    pub top_rated_unsubscribed_genre_song: Option<SongRecommendation>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        #[test]
        fn rating_value_accepts_exactly_the_star_range(raw in any::<i64>()) {
            let parsed = RatingValue::try_from(raw);
            prop_assert_eq!(parsed.is_ok(), (1..=5).contains(&raw));
            if let Ok(value) = parsed {
                prop_assert_eq!(i64::from(value.get()), raw);
            }
        }
    }

    #[test]
    fn rating_value_accepts_one_through_five() {
        for v in 1..=5 {
            assert_eq!(RatingValue::try_from(v).unwrap().get(), u8::try_from(v).unwrap());
        }
        assert_eq!(RatingValue::try_from(0), Err(InvalidRating(0)));
        assert_eq!(RatingValue::try_from(6), Err(InvalidRating(6)));
        assert_eq!(RatingValue::try_from(-3), Err(InvalidRating(-3)));
        assert_eq!(RatingValue::try_from(300), Err(InvalidRating(300)));
    }

    #[test]
    fn rating_value_rejects_out_of_range_json() {
        let parsed: Result<RatingValue, _> = serde_json::from_value(json!(9));
        assert!(parsed.is_err());
        let parsed: RatingValue = serde_json::from_value(json!(4)).unwrap();
        assert_eq!(parsed.get(), 4);
    }

    #[test]
    fn subscription_serializes_flat_with_type_tag() {
        let sub = Subscription {
            id: "s1".into(),
            user_id: "u1".into(),
            target: SubscriptionTarget::artist("a1"),
            created_at: DateTime::from_timestamp(0, 0).unwrap(),
        };
        let value = serde_json::to_value(&sub).unwrap();
        assert_eq!(value["type"], "artist");
        assert_eq!(value["artistId"], "a1");
        assert_eq!(value["userId"], "u1");
        assert!(value.get("genre").is_none());

        let back: Subscription = serde_json::from_value(value).unwrap();
        assert_eq!(back, sub);
    }

    #[test]
    fn recommendation_set_keeps_field_order_and_null() {
        let set = RecommendationSet::default();
        let text = serde_json::to_string(&set).unwrap();
        assert_eq!(text, r#"{"subscribedGenreSongs":[],"topRatedSong":null}"#);
    }

    #[test]
    fn notification_from_request_is_unread() {
        let request = NewNotification {
            user_id: "u1".into(),
            kind: "new_song".into(),
            message: "hi".into(),
            content_id: "s1".into(),
        };
        let row = Notification::from_request("n1".into(), request, Utc::now());
        assert!(!row.read);
        assert_eq!(row.kind, "new_song");
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["type"], "new_song");
        assert_eq!(value["contentId"], "s1");
    }
}
