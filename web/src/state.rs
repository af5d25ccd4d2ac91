//! Shared state for the Axum routers, one struct per service role.
//!
//! Every field is cheap to clone (services hold `Arc`s), as Axum requires.

use reqwest::Url;
use std::sync::Arc;
use tunestream_runtime::MetricsServer;
use tunestream_services::{
    CatalogService, NotificationService, RatingService, RecommendationAggregator,
    SubscriptionFanOut, SubscriptionService,
};

/// Identity reported by `GET /health`.
#[derive(Debug, Clone, Copy)]
pub struct ServiceInfo {
    /// Service role name, e.g. `ratings`.
    pub service: &'static str,
    /// Build version.
    pub version: &'static str,
}

impl ServiceInfo {
    /// Info for `service` at this crate's version.
    #[must_use]
    pub const fn new(service: &'static str) -> Self {
        Self {
            service,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Catalog service state.
#[derive(Clone)]
pub struct CatalogState {
    /// Catalog CRUD that emits domain events.
    pub catalog: CatalogService,
}

/// Subscriptions service state.
#[derive(Clone)]
pub struct SubscriptionsState {
    /// Subscription write path.
    pub subscriptions: SubscriptionService,
    /// Event ingress fan-out.
    pub fanout: SubscriptionFanOut,
}

/// Ratings service state.
#[derive(Clone)]
pub struct RatingsState {
    /// Rating write path.
    pub ratings: RatingService,
    /// `GET /recommendations`.
    pub recommendations: RecommendationAggregator,
}

/// Notifications service state.
#[derive(Clone)]
pub struct NotificationsState {
    /// Notification store front.
    pub notifications: NotificationService,
}

/// Base URLs the gateway proxies to, by path prefix.
#[derive(Debug, Clone)]
pub struct Upstreams {
    /// `/api/users/*`
    pub users: Url,
    /// `/api/content/*`
    pub content: Url,
    /// `/api/ratings/*`
    pub ratings: Url,
    /// `/api/subscriptions/*`
    pub subscriptions: Url,
    /// `/api/notifications/*`
    pub notifications: Url,
}

impl Upstreams {
    /// Upstream for a gateway path prefix.
    #[must_use]
    pub fn resolve(&self, prefix: &str) -> Option<&Url> {
        match prefix {
            "users" => Some(&self.users),
            "content" => Some(&self.content),
            "ratings" => Some(&self.ratings),
            "subscriptions" => Some(&self.subscriptions),
            "notifications" => Some(&self.notifications),
            _ => None,
        }
    }
}

/// Gateway state.
#[derive(Clone)]
pub struct GatewayState {
    /// Client used for every proxied call (carries the proxy timeout).
    pub client: reqwest::Client,
    /// Proxy targets.
    pub upstreams: Arc<Upstreams>,
}

/// State of `GET /metrics`.
#[derive(Clone)]
pub struct MetricsState {
    /// Installed recorder, if metrics are enabled.
    pub server: Arc<MetricsServer>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<CatalogState>();
        assert_clone::<SubscriptionsState>();
        assert_clone::<RatingsState>();
        assert_clone::<NotificationsState>();
        assert_clone::<GatewayState>();
    }

    #[test]
    fn upstreams_resolve_known_prefixes_only() {
        let url = |port: u16| Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
        let upstreams = Upstreams {
            users: url(8001),
            content: url(8002),
            ratings: url(8003),
            subscriptions: url(8004),
            notifications: url(8005),
        };
        assert_eq!(upstreams.resolve("ratings"), Some(&url(8003)));
        assert_eq!(upstreams.resolve("admin"), None);
    }
}
