//! # Tunestream Core
//!
//! Domain types and collaborator traits shared by the Tunestream services.
//!
//! The platform is a gateway in front of independent services (identity, catalog,
//! ratings, subscriptions, notifications) that talk to each other over HTTP. This
//! crate holds the pieces every one of them agrees on:
//!
//! - [`model`]: subscriptions, ratings, notifications, catalog records and the
//!   recommendation result
//! - [`event`]: the [`DomainEvent`](event::DomainEvent) sum type emitted by the
//!   catalog and consumed by subscription fan-out
//! - [`store`]: storage traits, one per logically separate store
//! - [`reference`]: foreign-reference validation ("does X exist in service Y")
//! - [`notify`]: the notification-creation collaborator
//!
//! ## Architecture
//!
//! ```text
//! client ─▶ admission ─▶ handler ─▶ ReferenceCheck ─▶ (breaker) ─▶ probe
//!
//! catalog write ─▶ EventPublisher ─ ─ ─▶ /events ─▶ fan-out ─▶ NotificationSink (×N)
//! ```
//!
//! All traits are object safe and return boxed futures so that services can hold
//! `Arc<dyn Trait>` collaborators and swap them for mocks in tests.

pub mod event;
pub mod model;
pub mod notify;
pub mod reference;
pub mod store;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use event::{DomainEvent, EventError, EventKind, EventPublisher};
pub use model::{
    Album, Artist, InvalidRating, NewNotification, Notification, Rating, RatingValue, RecommendationSet, Song,
    SongRecommendation, Subscription, SubscriptionKind, SubscriptionTarget,
};
pub use notify::{NotificationSink, NotifyError};
pub use reference::{Reference, ReferenceCheck};
pub use store::{
    CatalogReader, CatalogStore, NotificationStore, RatingStore, RatingWrite, StoreError,
    StoreFuture, SubscriptionDirectory, SubscriptionStore,
};

/// Environment module - injected dependencies that are not stores.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use tunestream_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by [`Utc::now`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
