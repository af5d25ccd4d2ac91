//! # Tunestream Testing
//!
//! Mocks and fixtures shared by the test suites of the Tunestream crates.
//!
//! - [`mocks`]: deterministic clock, recording notification sink and event
//!   publisher, scripted reference checks
//! - [`fixtures`]: catalog records and subscriptions with sensible defaults
//!
//! ## Example
//!
//! ```
//! use tunestream_testing::mocks::RecordingNotificationSink;
//! use tunestream_core::{NewNotification, NotificationSink};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let sink = RecordingNotificationSink::new().failing_for("u2");
//! let note = |user: &str| NewNotification {
//!     user_id: user.into(),
//!     kind: "new_song".into(),
//!     message: "m".into(),
//!     content_id: "s1".into(),
//! };
//!
//! assert!(sink.dispatch(note("u1")).await.is_ok());
//! assert!(sink.dispatch(note("u2")).await.is_err());
//! assert_eq!(sink.delivered().len(), 1);
//! # }
//! ```

use chrono::{DateTime, Utc};
use tunestream_core::environment::Clock;

/// Mock implementations of collaborator traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::collections::{HashMap, HashSet};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex, PoisonError};
    use tunestream_core::{
        DomainEvent, EventPublisher, NewNotification, NotificationSink, NotifyError, Reference,
        ReferenceCheck,
    };

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use tunestream_testing::mocks::FixedClock;
    /// use tunestream_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }

    /// Notification sink that records what it was asked to create.
    ///
    /// Dispatches to users registered with [`failing_for`](Self::failing_for)
    /// fail with [`NotifyError::Rejected`] and are recorded as attempts only.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingNotificationSink {
        delivered: Arc<Mutex<Vec<NewNotification>>>,
        attempts: Arc<Mutex<Vec<NewNotification>>>,
        failing: Arc<Mutex<HashSet<String>>>,
    }

    impl RecordingNotificationSink {
        /// Create a sink that accepts everything.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail every dispatch addressed to `user_id`.
        #[must_use]
        pub fn failing_for(self, user_id: &str) -> Self {
            self.failing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(user_id.to_owned());
            self
        }

        /// Notifications created successfully, in dispatch order.
        #[must_use]
        pub fn delivered(&self) -> Vec<NewNotification> {
            self.delivered.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        /// Every dispatch attempted, including failed ones.
        #[must_use]
        pub fn attempts(&self) -> Vec<NewNotification> {
            self.attempts.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    impl NotificationSink for RecordingNotificationSink {
        fn dispatch(
            &self,
            notification: NewNotification,
        ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
            Box::pin(async move {
                self.attempts
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(notification.clone());
                let fails = self
                    .failing
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .contains(&notification.user_id);
                if fails {
                    return Err(NotifyError::Rejected { status: 500 });
                }
                self.delivered
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(notification);
                Ok(())
            })
        }
    }

    /// Event publisher that keeps every published event.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingPublisher {
        events: Arc<Mutex<Vec<DomainEvent>>>,
    }

    impl RecordingPublisher {
        /// Create an empty publisher.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Events published so far.
        #[must_use]
        pub fn events(&self) -> Vec<DomainEvent> {
            self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    impl EventPublisher for RecordingPublisher {
        fn publish(&self, event: DomainEvent) {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event);
        }
    }

    /// Reference check answering from a fixed table; unknown ids are
    /// [`Reference::Missing`].
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedReferences {
        answers: HashMap<String, Reference>,
        asked: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedReferences {
        /// Create an empty table.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer `reference` for `id`.
        #[must_use]
        pub fn with(mut self, id: &str, reference: Reference) -> Self {
            self.answers.insert(id.to_owned(), reference);
            self
        }

        /// Ids checked so far.
        #[must_use]
        pub fn asked(&self) -> Vec<String> {
            self.asked.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    impl ReferenceCheck for ScriptedReferences {
        fn check<'a>(&'a self, id: &'a str) -> Pin<Box<dyn Future<Output = Reference> + Send + 'a>> {
            self.asked
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(id.to_owned());
            let answer = self.answers.get(id).copied().unwrap_or(Reference::Missing);
            Box::pin(async move { answer })
        }
    }
}

/// Catalog and subscription fixtures.
pub mod fixtures {
    use super::mocks::test_clock;
    use super::Clock;
    use std::collections::BTreeSet;
    use tunestream_core::{
        Album, Artist, Rating, RatingValue, Song, Subscription, SubscriptionTarget,
    };

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    /// A song on album `b1` by artist `a1`, 180 seconds long.
    #[must_use]
    pub fn song(id: &str, genre: &str) -> Song {
        Song {
            id: id.to_owned(),
            name: format!("Song {id}"),
            duration: 180,
            genre: genre.to_owned(),
            album_id: "b1".to_owned(),
            artist_ids: set(&["a1"]),
        }
    }

    /// An artist playing `genres`.
    #[must_use]
    pub fn artist(id: &str, genres: &[&str]) -> Artist {
        Artist {
            id: id.to_owned(),
            name: format!("Artist {id}"),
            biography: String::new(),
            genres: set(genres),
        }
    }

    /// An album credited to `artists`.
    #[must_use]
    pub fn album(id: &str, genre: &str, artists: &[&str]) -> Album {
        Album {
            id: id.to_owned(),
            name: format!("Album {id}"),
            genre: genre.to_owned(),
            artist_ids: set(artists),
        }
    }

    /// A subscription stamped with the test clock.
    #[must_use]
    pub fn subscription(id: &str, user_id: &str, target: SubscriptionTarget) -> Subscription {
        Subscription {
            id: id.to_owned(),
            user_id: user_id.to_owned(),
            target,
            created_at: test_clock().now(),
        }
    }

    /// A rating stamped with the test clock.
    #[must_use]
    pub fn rating(song_id: &str, user_id: &str, value: RatingValue) -> Rating {
        Rating {
            song_id: song_id.to_owned(),
            user_id: user_id.to_owned(),
            value,
            updated_at: test_clock().now(),
        }
    }
}
