//! Wiring of one service role from [`Config`].
//!
//! Every role runs on in-memory stores. Cross-service collaborators are the
//! reqwest clients from `tunestream-clients`:
//!
//! ```text
//! catalog ──emit──▶ subscriptions /events ──fan-out──▶ notifications
//! subscriptions ──probe (breaker)──▶ catalog /artists/:id
//! ratings ──probe (breaker)──▶ catalog /songs/exists
//! ratings ──read──▶ subscriptions /subscriptions, catalog /songs
//! gateway ──proxy──▶ everything
//! ```

use anyhow::Context;
use axum::Router;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tunestream_clients::{
    EventEmitter, GuardedExistenceClient, HttpExistenceClient, HttpNotificationSink, ProbeTarget,
    RemoteCatalog, RemoteSubscriptions,
};
use tunestream_core::environment::SystemClock;
use tunestream_runtime::{
    AdmissionConfig, AdmissionLimiter, CircuitBreaker, CircuitBreakerConfig, RetryPolicy,
};
use tunestream_services::{
    CatalogService, InMemoryCatalog, InMemoryNotificationStore, InMemoryRatingStore,
    InMemorySubscriptionStore, NotificationService, RatingService, RecommendationAggregator,
    SubscriptionFanOut, SubscriptionService,
};
use tunestream_web::{
    CatalogState, GatewayState, MetricsState, NotificationsState, RatingsState,
    SubscriptionsState, Upstreams, catalog_router, gateway_router, notifications_router,
    ratings_router, subscriptions_router,
};

use crate::config::{Config, ServiceRole};

/// Name of the breaker guarding calls into the catalog.
pub const CONTENT_BREAKER: &str = "content-service";

/// A wired service, ready to serve.
pub struct Service {
    /// Role it was built for
    pub role: ServiceRole,
    /// Router with every layer applied
    pub router: Router,
    /// Background tasks to abort on shutdown
    pub background: Vec<JoinHandle<()>>,
}

/// Build the router and background tasks for `config.role`.
///
/// Must be called inside a Tokio runtime (the gateway spawns its admission
/// sweepers here).
///
/// # Errors
///
/// Fails if a configured service URL is invalid or an HTTP client cannot be
/// built.
pub fn build(config: &Config, metrics: Option<MetricsState>) -> anyhow::Result<Service> {
    let mut background = Vec::new();
    let router = match config.role {
        ServiceRole::Catalog => catalog(config, metrics)?,
        ServiceRole::Subscriptions => subscriptions(config, metrics)?,
        ServiceRole::Ratings => ratings(config, metrics)?,
        ServiceRole::Notifications => notifications(metrics),
        ServiceRole::Gateway => gateway(config, metrics, &mut background)?,
    };
    Ok(Service {
        role: config.role,
        router,
        background,
    })
}

fn content_breaker(config: &Config) -> CircuitBreaker {
    CircuitBreaker::new(
        CONTENT_BREAKER,
        CircuitBreakerConfig::builder()
            .max_failures(config.breaker.max_failures)
            .reset_timeout(config.breaker.reset_timeout)
            .build(),
    )
}

fn guarded_probe(config: &Config, target: ProbeTarget) -> anyhow::Result<GuardedExistenceClient> {
    let probe = HttpExistenceClient::new(
        CONTENT_BREAKER,
        &config.urls.content,
        target,
        RetryPolicy::fixed(config.probe.attempts, config.probe.backoff),
        config.http_timeout,
    )
    .context("content service probe")?;
    Ok(GuardedExistenceClient::new(probe, content_breaker(config)))
}

fn catalog(config: &Config, metrics: Option<MetricsState>) -> anyhow::Result<Router> {
    let emitter = EventEmitter::new(
        &config.urls.subscriptions,
        config.http_timeout,
        config.emitter_max_in_flight,
    )
    .context("event emitter")?;
    let state = CatalogState {
        catalog: CatalogService::new(Arc::new(InMemoryCatalog::new()), Arc::new(emitter)),
    };
    Ok(catalog_router(state, metrics))
}

fn subscriptions(config: &Config, metrics: Option<MetricsState>) -> anyhow::Result<Router> {
    let store = Arc::new(InMemorySubscriptionStore::new());
    let sink = HttpNotificationSink::new(&config.urls.notifications, config.http_timeout)
        .context("notification sink")?;
    let state = SubscriptionsState {
        subscriptions: SubscriptionService::new(
            store.clone(),
            Arc::new(guarded_probe(config, ProbeTarget::artists())?),
            Arc::new(SystemClock),
        ),
        fanout: SubscriptionFanOut::new(store, Arc::new(sink)),
    };
    Ok(subscriptions_router(state, metrics))
}

fn ratings(config: &Config, metrics: Option<MetricsState>) -> anyhow::Result<Router> {
    let store = Arc::new(InMemoryRatingStore::new());
    let subscriptions = RemoteSubscriptions::new(&config.urls.subscriptions, config.http_timeout)
        .context("subscriptions reader")?;
    let catalog = RemoteCatalog::new(&config.urls.content, config.http_timeout)
        .context("catalog reader")?;
    let state = RatingsState {
        ratings: RatingService::new(
            store.clone(),
            Arc::new(guarded_probe(config, ProbeTarget::songs())?),
            Arc::new(SystemClock),
        ),
        recommendations: RecommendationAggregator::new(
            Arc::new(subscriptions),
            store,
            Arc::new(catalog),
        ),
    };
    Ok(ratings_router(state, metrics))
}

fn notifications(metrics: Option<MetricsState>) -> Router {
    let state = NotificationsState {
        notifications: NotificationService::new(
            Arc::new(InMemoryNotificationStore::new()),
            Arc::new(SystemClock),
        ),
    };
    notifications_router(state, metrics)
}

fn gateway(
    config: &Config,
    metrics: Option<MetricsState>,
    background: &mut Vec<JoinHandle<()>>,
) -> anyhow::Result<Router> {
    let parse = |name: &str, url: &str| {
        reqwest::Url::parse(url).with_context(|| format!("{name} service URL '{url}'"))
    };
    let upstreams = Upstreams {
        users: parse("users", &config.urls.users)?,
        content: parse("content", &config.urls.content)?,
        ratings: parse("ratings", &config.urls.ratings)?,
        subscriptions: parse("subscriptions", &config.urls.subscriptions)?,
        notifications: parse("notifications", &config.urls.notifications)?,
    };
    let client = reqwest::Client::builder()
        .timeout(config.proxy_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("proxy client")?;

    let global = Arc::new(AdmissionLimiter::new(
        "gateway",
        AdmissionConfig::new(config.gateway_limit.max_requests, config.gateway_limit.window),
    ));
    let sensitive = Arc::new(AdmissionLimiter::new(
        "identity",
        AdmissionConfig::new(config.identity_limit.max_requests, config.identity_limit.window),
    ));
    background.push(global.spawn_sweeper(config.admission_sweep));
    background.push(sensitive.spawn_sweeper(config.admission_sweep));

    let state = GatewayState {
        client,
        upstreams: Arc::new(upstreams),
    };
    Ok(gateway_router(state, global, sensitive, metrics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn config(role: &str) -> Config {
        let role = role.to_string();
        Config::from_lookup(move |key| (key == "TUNESTREAM_SERVICE").then(|| role.clone())).unwrap()
    }

    #[tokio::test]
    async fn every_role_serves_health() {
        for role in ["gateway", "catalog", "subscriptions", "ratings", "notifications"] {
            let service = build(&config(role), None).unwrap();
            let response = service
                .router
                .oneshot(Request::get("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{role}");

            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["service"], service.role.as_str());

            for task in service.background {
                task.abort();
            }
        }
    }

    #[tokio::test]
    async fn gateway_spawns_both_sweepers() {
        let service = build(&config("gateway"), None).unwrap();
        assert_eq!(service.background.len(), 2);
        for task in service.background {
            task.abort();
        }
    }

    #[tokio::test]
    async fn bad_upstream_url_fails_bootstrap() {
        let mut config = config("gateway");
        config.urls.ratings = "not a url".to_string();
        assert!(build(&config, None).is_err());
    }
}
