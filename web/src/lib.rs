//! HTTP surface of the Tunestream services.
//!
//! Each service role gets its own Axum router (see [`router`]). Handlers are
//! thin: they parse the request, call into `tunestream-services`, and map the
//! typed error onto a status code through [`AppError`].
//!
//! # Request Flow
//!
//! ```text
//! request
//!   → correlation id layer (http_request span, x-correlation-id)
//!   → TraceLayer
//!   → admission (gateway only, keyed by client IP)
//!   → handler → service → store / reference probe / event publisher
//!   → AppError or JSON body
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tunestream_web::{router::ratings_router, state::RatingsState};
//!
//! let app = ratings_router(RatingsState { ratings, recommendations }, None);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8083").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::AppError;
pub use extractors::{ClientIp, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use router::{
    catalog_router, gateway_router, notifications_router, ratings_router, subscriptions_router,
};
pub use state::{
    CatalogState, GatewayState, MetricsState, NotificationsState, RatingsState, ServiceInfo,
    SubscriptionsState, Upstreams,
};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
