//! Router composition, one router per service role.
//!
//! Every router gets `GET /health`, optionally `GET /metrics`, a
//! `TraceLayer` and the correlation id layer (outermost, so the trace span
//! runs inside the `http_request` span).
//!
//! # Routes
//!
//! ## Catalog
//! - `POST /artists`, `POST /albums`, `POST /songs`
//! - `GET /artists/:id`, `GET /albums/:id`, `GET /songs`, `GET /songs/:id`
//! - `GET /songs/exists?id=`
//!
//! ## Subscriptions
//! - `POST /events`
//! - `POST|DELETE /subscribe-artist?userId=&artistId=`
//! - `POST|DELETE /subscribe-genre?userId=&genre=`
//! - `GET /subscriptions?userId=|artistId=|genre=`
//!
//! ## Ratings
//! - `POST /rate-song?songId=&userId=&rating=`
//! - `DELETE /delete-rating?songId=&userId=`
//! - `GET /get-rating?songId=&userId=`
//! - `GET /recommendations?userId=`
//!
//! ## Notifications
//! - `POST /notifications`, `GET /notifications?userId=`
//!
//! ## Gateway
//! - `ANY /api/:service` and `ANY /api/:service/*rest`, behind the global limiter and, for identity
//!   login/register/recovery, the sensitive limiter

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{any, delete, get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tunestream_runtime::AdmissionLimiter;

use crate::handlers::{catalog, gateway, health, notifications, ratings, subscriptions};
use crate::middleware::{admit, correlation_id_layer};
use crate::state::{
    CatalogState, GatewayState, MetricsState, NotificationsState, RatingsState, ServiceInfo,
    SubscriptionsState,
};

fn finish(app: Router, info: ServiceInfo, metrics: Option<MetricsState>) -> Router {
    let mut app = app.merge(
        Router::new()
            .route("/health", get(health::health_check))
            .with_state(info),
    );
    if let Some(metrics) = metrics {
        app = app.merge(
            Router::new()
                .route("/metrics", get(health::metrics))
                .with_state(metrics),
        );
    }
    app.layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
}

/// Catalog service router.
pub fn catalog_router(state: CatalogState, metrics: Option<MetricsState>) -> Router {
    let app = Router::new()
        .route("/artists", post(catalog::create_artist))
        .route("/artists/:id", get(catalog::get_artist))
        .route("/albums", post(catalog::create_album))
        .route("/albums/:id", get(catalog::get_album))
        .route("/songs", get(catalog::list_songs).post(catalog::create_song))
        .route("/songs/exists", get(catalog::song_exists))
        .route("/songs/:id", get(catalog::get_song))
        .with_state(state);
    finish(app, ServiceInfo::new("catalog"), metrics)
}

/// Subscriptions service router, including event ingress.
pub fn subscriptions_router(state: SubscriptionsState, metrics: Option<MetricsState>) -> Router {
    let app = Router::new()
        .route("/events", post(subscriptions::ingest_event))
        .route(
            "/subscribe-artist",
            post(subscriptions::subscribe_artist).delete(subscriptions::unsubscribe_artist),
        )
        .route(
            "/subscribe-genre",
            post(subscriptions::subscribe_genre).delete(subscriptions::unsubscribe_genre),
        )
        .route("/subscriptions", get(subscriptions::list_subscriptions))
        .with_state(state);
    finish(app, ServiceInfo::new("subscriptions"), metrics)
}

/// Ratings service router.
pub fn ratings_router(state: RatingsState, metrics: Option<MetricsState>) -> Router {
    let app = Router::new()
        .route("/rate-song", post(ratings::rate_song))
        .route("/delete-rating", delete(ratings::delete_rating))
        .route("/get-rating", get(ratings::get_rating))
        .route("/recommendations", get(ratings::recommendations))
        .with_state(state);
    finish(app, ServiceInfo::new("ratings"), metrics)
}

/// Notifications service router.
pub fn notifications_router(state: NotificationsState, metrics: Option<MetricsState>) -> Router {
    let app = Router::new()
        .route(
            "/notifications",
            post(notifications::create_notification).get(notifications::list_notifications),
        )
        .with_state(state);
    finish(app, ServiceInfo::new("notifications"), metrics)
}

/// Gateway router.
///
/// `global` gates every proxied request; `sensitive` additionally gates
/// [`gateway::SENSITIVE_PREFIXES`]. Both are keyed by client IP.
pub fn gateway_router(
    state: GatewayState,
    global: Arc<AdmissionLimiter>,
    sensitive: Arc<AdmissionLimiter>,
    metrics: Option<MetricsState>,
) -> Router {
    let app = Router::new()
        .route("/api/:service", any(gateway::proxy_collection))
        .route("/api/:service/*rest", any(gateway::proxy))
        .route_layer(from_fn_with_state(sensitive, gateway::sensitive_gate))
        .route_layer(from_fn_with_state(global, admit))
        .with_state(state);
    finish(app, ServiceInfo::new("gateway"), metrics).layer(CorsLayer::very_permissive())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use reqwest::Url;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tower::ServiceExt;
    use tunestream_core::{CatalogStore, Reference};
    use tunestream_runtime::AdmissionConfig;
    use tunestream_services::{
        CatalogService, InMemoryCatalog, InMemoryNotificationStore, InMemoryRatingStore,
        InMemorySubscriptionStore, NotificationService, RatingService, RecommendationAggregator,
        SubscriptionFanOut, SubscriptionService,
    };
    use tunestream_testing::fixtures;
    use tunestream_testing::mocks::{
        RecordingNotificationSink, RecordingPublisher, ScriptedReferences, test_clock,
    };
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn text_body(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn catalog_app() -> (Router, Arc<RecordingPublisher>) {
        let events = Arc::new(RecordingPublisher::new());
        let state = CatalogState {
            catalog: CatalogService::new(Arc::new(InMemoryCatalog::new()), events.clone()),
        };
        (catalog_router(state, None), events)
    }

    fn subscriptions_app(sink: Arc<RecordingNotificationSink>) -> Router {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let state = SubscriptionsState {
            subscriptions: SubscriptionService::new(
                store.clone(),
                Arc::new(ScriptedReferences::new().with("a1", Reference::Exists)),
                Arc::new(test_clock()),
            ),
            fanout: SubscriptionFanOut::new(store, sink),
        };
        subscriptions_router(state, None)
    }

    async fn ratings_app() -> Router {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.insert_song(fixtures::song("s1", "Rock")).await.unwrap();
        let ratings = Arc::new(InMemoryRatingStore::new());
        let songs = ScriptedReferences::new()
            .with("s1", Reference::Exists)
            .with("s2", Reference::Unavailable);
        let state = RatingsState {
            ratings: RatingService::new(ratings.clone(), Arc::new(songs), Arc::new(test_clock())),
            recommendations: RecommendationAggregator::new(
                Arc::new(InMemorySubscriptionStore::new()),
                ratings,
                catalog,
            ),
        };
        ratings_router(state, None)
    }

    #[tokio::test]
    async fn health_reports_service_and_echoes_correlation_id() {
        let (app, _) = catalog_app();
        let response = send(&app, "GET", "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-correlation-id"));
        assert_eq!(json_body(response).await["service"], "catalog");
    }

    #[tokio::test]
    async fn catalog_create_and_probe() {
        let (app, events) = catalog_app();

        let response = send(&app, "POST", "/songs", Some(json!({"name": "x", "genre": "Rock", "albumId": "b9"}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&app, "POST", "/albums", Some(json!({"name": "First", "genre": "Rock", "artistIds": ["a1"]}))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let album_id = json_body(response).await["id"].as_str().unwrap().to_owned();

        let response = send(&app, "POST", "/songs", Some(json!({"name": "Intro", "duration": 90, "genre": "Rock", "albumId": album_id}))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let song_id = json_body(response).await["id"].as_str().unwrap().to_owned();

        let response = send(&app, "GET", &format!("/songs/exists?id={song_id}"), None).await;
        assert_eq!(json_body(response).await, json!({"exists": true}));
        let response = send(&app, "GET", "/songs/exists?id=nope", None).await;
        assert_eq!(json_body(response).await, json!({"exists": false}));

        let response = send(&app, "GET", "/artists/nope", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(events.events().len(), 2);
    }

    #[tokio::test]
    async fn event_ingress_accepts_known_types_only() {
        let sink = Arc::new(RecordingNotificationSink::new());
        let app = subscriptions_app(sink.clone());

        let response = send(&app, "POST", "/subscribe-genre?userId=u1&genre=Rock", None).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = send(&app, "POST", "/subscribe-genre?userId=u1&genre=Rock", None).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(&app, "POST", "/events", Some(json!({"type": "deleted_song", "songId": "s1"}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = send(&app, "POST", "/events", Some(json!({"artistId": "a1"}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let event = json!({"type": "new_artist", "artistId": "a9", "name": "Nova", "genres": ["Rock"]});
        let response = send(&app, "POST", "/events", Some(event)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["matched"], 1);
        assert_eq!(body["dispatched"], 1);
        assert_eq!(sink.delivered()[0].user_id, "u1");
    }

    #[tokio::test]
    async fn fan_out_failure_still_answers_202() {
        let sink = Arc::new(RecordingNotificationSink::new().failing_for("u1"));
        let app = subscriptions_app(sink);
        send(&app, "POST", "/subscribe-artist?userId=u1&artistId=a1", None).await;

        let event = json!({"type": "new_song", "songId": "s1", "name": "Intro", "genre": "Rock", "artistIds": ["a1"], "albumId": "b1"});
        let response = send(&app, "POST", "/events", Some(event)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["failed"], 1);
    }

    #[tokio::test]
    async fn subscription_index_needs_exactly_one_key() {
        let app = subscriptions_app(Arc::new(RecordingNotificationSink::new()));
        send(&app, "POST", "/subscribe-artist?userId=u1&artistId=a1", None).await;

        let response = send(&app, "GET", "/subscriptions?artistId=a1", None).await;
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);
        let response = send(&app, "GET", "/subscriptions", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&app, "POST", "/subscribe-artist?userId=u1&artistId=ghost", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rating_statuses() {
        let app = ratings_app().await;

        let response = send(&app, "POST", "/rate-song?songId=s1&userId=u1&rating=4", None).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = send(&app, "POST", "/rate-song?songId=s1&userId=u1&rating=5", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&app, "GET", "/get-rating?songId=s1&userId=u1", None).await;
        assert_eq!(json_body(response).await, json!({"rating": 5}));

        let response = send(&app, "POST", "/rate-song?songId=s1&userId=u1&rating=9", None).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = send(&app, "POST", "/rate-song?songId=s3&userId=u1&rating=3", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, "POST", "/rate-song?songId=s2&userId=u1&rating=3", None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(text_body(response).await, "Content service temporarily unavailable");

        let response = send(&app, "DELETE", "/delete-rating?songId=s1&userId=u1", None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = send(&app, "DELETE", "/delete-rating?songId=s1&userId=u1", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(&app, "GET", "/get-rating?songId=s1&userId=u1", None).await;
        assert_eq!(json_body(response).await, json!({"rating": null}));
    }

    #[tokio::test]
    async fn recommendations_shape() {
        let app = ratings_app().await;
        let response = send(&app, "GET", "/recommendations?userId=u1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["subscribedGenreSongs"], json!([]));
        assert_eq!(body["topRatedSong"]["songId"], "s1");

        let response = send(&app, "GET", "/recommendations", None).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn notifications_create_and_list() {
        let state = NotificationsState {
            notifications: NotificationService::new(
                Arc::new(InMemoryNotificationStore::new()),
                Arc::new(test_clock()),
            ),
        };
        let app = notifications_router(state, None);

        let request = json!({"userId": "u1", "type": "new_song", "message": "m", "contentId": "s1"});
        let response = send(&app, "POST", "/notifications", Some(request)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json_body(response).await["read"], false);

        let bad = json!({"userId": "u1", "type": "", "message": "m", "contentId": "s1"});
        let response = send(&app, "POST", "/notifications", Some(bad)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = send(&app, "GET", "/notifications?userId=u1", None).await;
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);
    }

    fn gateway_app(upstream: &str, global: u32, sensitive: u32) -> Router {
        let url = Url::parse(upstream).unwrap();
        let state = GatewayState {
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(500))
                .build()
                .unwrap(),
            upstreams: Arc::new(crate::state::Upstreams {
                users: url.clone(),
                content: url.clone(),
                ratings: url.clone(),
                subscriptions: url.clone(),
                notifications: url,
            }),
        };
        let window = Duration::from_secs(60);
        gateway_router(
            state,
            Arc::new(AdmissionLimiter::new("gateway", AdmissionConfig::new(global, window))),
            Arc::new(AdmissionLimiter::new("identity", AdmissionConfig::new(sensitive, window))),
            None,
        )
    }

    #[tokio::test]
    async fn gateway_forwards_path_query_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recommendations"))
            .and(query_param("userId", "u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"subscribedGenreSongs": [], "topRatedSong": null})))
            .expect(1)
            .mount(&server)
            .await;

        let app = gateway_app(&server.uri(), 100, 10);
        let response = send(&app, "GET", "/api/ratings/recommendations?userId=u1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["topRatedSong"], Value::Null);

        let response = send(&app, "GET", "/api/admin/anything", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn gateway_forwards_collection_routes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notifications"))
            .and(query_param("userId", "u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .and(query_param("userId", "u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let app = gateway_app(&server.uri(), 100, 10);
        let response = send(&app, "GET", "/api/notifications?userId=u1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&app, "GET", "/api/subscriptions?userId=u1", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, "GET", "/api/admin", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn collection_routes_share_the_global_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let app = gateway_app(&server.uri(), 1, 10);

        let response = send(&app, "GET", "/api/notifications?userId=u1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&app, "GET", "/api/notifications?userId=u1", None).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn gateway_unreachable_upstream_is_503() {
        let app = gateway_app("http://127.0.0.1:9", 100, 10);
        let response = send(&app, "GET", "/api/content/songs", None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(text_body(response).await, "Service unavailable");
    }

    #[tokio::test]
    async fn gateway_limits_sensitive_routes_harder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let app = gateway_app(&server.uri(), 5, 1);

        let response = send(&app, "POST", "/api/users/login/request-otp", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&app, "POST", "/api/users/login/request-otp", None).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // Non-sensitive routes only count against the global budget (2 of 5 used)
        for _ in 0..3 {
            let response = send(&app, "POST", "/api/content/artists", None).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = send(&app, "POST", "/api/content/artists", None).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
