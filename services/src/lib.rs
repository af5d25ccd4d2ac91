//! # Tunestream Services
//!
//! Business logic of the Tunestream services, independent of HTTP.
//!
//! ## Event path
//!
//! ```text
//! CatalogService::create_*  ──store write──▶ EventPublisher::publish
//!                                                 │ (fire-and-forget POST /events)
//!                                                 ▼
//!                          SubscriptionFanOut::handle_event
//!                                                 │ one dispatch per matching subscription
//!                                                 ▼
//!                          NotificationSink::dispatch ──▶ NotificationService::create
//! ```
//!
//! ## Read path
//!
//! [`RecommendationAggregator`] combines subscriptions, ratings and the catalog
//! for `GET /recommendations`.
//!
//! ## Write paths
//!
//! [`SubscriptionService`] and [`RatingService`] validate foreign references
//! through a [`ReferenceCheck`](tunestream_core::ReferenceCheck) before writing.
//!
//! [`memory`] holds the in-memory stores every service runs on.

pub mod catalog;
pub mod fanout;
pub mod memory;
pub mod notifications;
pub mod ratings;
pub mod recommendations;
pub mod subscriptions;

pub use catalog::{CatalogError, CatalogService, CreateAlbum, CreateArtist, CreateSong};
pub use fanout::{FanOutReport, SubscriptionFanOut};
pub use memory::{
    InMemoryCatalog, InMemoryNotificationStore, InMemoryRatingStore, InMemorySubscriptionStore,
};
pub use notifications::{NotificationError, NotificationService};
pub use ratings::{RatingError, RatingService};
pub use recommendations::RecommendationAggregator;
pub use subscriptions::{SubscriptionError, SubscriptionService};
