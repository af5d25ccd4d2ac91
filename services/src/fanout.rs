//! Subscription fan-out.
//!
//! Turns one inbound [`DomainEvent`] into one notification per matching
//! subscription:
//!
//! | event | index | message |
//! |---|---|---|
//! | `new_artist` | genre subscriptions, per genre of the artist | `New artist '<name>' in genre <genre> has been added` |
//! | `new_album` | artist subscriptions, per credited artist | `New album '<name>' by artist has been released` |
//! | `new_song` | artist subscriptions, per credited artist | `New song '<name>' by artist has been added` |
//!
//! Every notification carries `contentId = subject id` and `type = event tag`.
//!
//! Dispatch is isolated per recipient: a failed lookup or a failed dispatch is
//! logged and counted, and the remaining recipients are still notified.
//!
//! There is no dedup key. Handling the same event twice creates every
//! notification twice, and a user following two of the event's genres (or
//! artists) gets one notification per match.

use std::sync::Arc;
use tunestream_core::{
    DomainEvent, EventKind, NewNotification, NotificationSink, Subscription, SubscriptionDirectory,
};
use tunestream_runtime::metrics::FanOutMetrics;

/// Outcome counters for one handled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutReport {
    /// Kind of the handled event.
    pub kind: EventKind,
    /// Subscriptions matched across all lookup keys.
    pub matched: usize,
    /// Notifications created.
    pub dispatched: usize,
    /// Notifications that failed to be created.
    pub failed: usize,
    /// Index lookups that failed (their subscribers were not reached).
    pub failed_lookups: usize,
}

impl FanOutReport {
    const fn new(kind: EventKind) -> Self {
        Self {
            kind,
            matched: 0,
            dispatched: 0,
            failed: 0,
            failed_lookups: 0,
        }
    }

    /// `true` if nothing failed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.failed == 0 && self.failed_lookups == 0
    }
}

/// Resolves interested users for an event and notifies each of them.
#[derive(Clone)]
pub struct SubscriptionFanOut {
    directory: Arc<dyn SubscriptionDirectory>,
    sink: Arc<dyn NotificationSink>,
}

impl SubscriptionFanOut {
    /// Create a fan-out over `directory`, notifying through `sink`.
    #[must_use]
    pub fn new(directory: Arc<dyn SubscriptionDirectory>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { directory, sink }
    }

    /// Handle one event. Never fails; problems are reported in the counters.
    pub async fn handle_event(&self, event: &DomainEvent) -> FanOutReport {
        let kind = event.kind();
        let mut report = FanOutReport::new(kind);

        match event {
            DomainEvent::NewArtist(artist) => {
                for genre in artist.genres.iter().filter(|g| !g.trim().is_empty()) {
                    let message = format!(
                        "New artist '{}' in genre {genre} has been added",
                        artist.name
                    );
                    let matches = self.lookup(&mut report, "genre", genre, self.directory.by_genre(genre)).await;
                    self.notify_all(&mut report, event, &matches, &message).await;
                }
            }
            DomainEvent::NewAlbum(album) => {
                let message = format!("New album '{}' by artist has been released", album.name);
                self.fan_out_to_artists(&mut report, event, &album.artist_ids, &message)
                    .await;
            }
            DomainEvent::NewSong(song) => {
                let message = format!("New song '{}' by artist has been added", song.name);
                self.fan_out_to_artists(&mut report, event, &song.artist_ids, &message)
                    .await;
            }
        }

        FanOutMetrics::record_event(kind.as_str(), report.matched);
        tracing::info!(
            event_type = %kind,
            subject = %event.subject_id(),
            matched = report.matched,
            dispatched = report.dispatched,
            failed = report.failed,
            failed_lookups = report.failed_lookups,
            "Fan-out complete"
        );
        report
    }

    async fn fan_out_to_artists(
        &self,
        report: &mut FanOutReport,
        event: &DomainEvent,
        artist_ids: &std::collections::BTreeSet<String>,
        message: &str,
    ) {
        for artist_id in artist_ids.iter().filter(|a| !a.trim().is_empty()) {
            let matches = self
                .lookup(report, "artist", artist_id, self.directory.by_artist(artist_id))
                .await;
            self.notify_all(report, event, &matches, message).await;
        }
    }

    async fn lookup(
        &self,
        report: &mut FanOutReport,
        index: &'static str,
        key: &str,
        query: tunestream_core::StoreFuture<'_, Vec<Subscription>>,
    ) -> Vec<Subscription> {
        match query.await {
            Ok(matches) => {
                report.matched += matches.len();
                matches
            }
            Err(error) => {
                report.failed_lookups += 1;
                tracing::warn!(index, key = %key, error = %error, "Subscription lookup failed, skipping key");
                Vec::new()
            }
        }
    }

    async fn notify_all(
        &self,
        report: &mut FanOutReport,
        event: &DomainEvent,
        subscriptions: &[Subscription],
        message: &str,
    ) {
        let kind = event.kind().as_str();
        for subscription in subscriptions {
            let notification = NewNotification {
                user_id: subscription.user_id.clone(),
                kind: kind.to_owned(),
                message: message.to_owned(),
                content_id: event.subject_id().to_owned(),
            };

            match self.sink.dispatch(notification).await {
                Ok(()) => {
                    report.dispatched += 1;
                    FanOutMetrics::record_dispatched(kind);
                }
                Err(error) => {
                    report.failed += 1;
                    FanOutMetrics::record_failed(kind);
                    tracing::warn!(
                        event_type = kind,
                        user_id = %subscription.user_id,
                        subscription_id = %subscription.id,
                        error = %error,
                        "Notification dispatch failed, continuing with remaining subscribers"
                    );
                }
            }
        }
    }
}
