//! Axum middleware for request tracking and admission control.
//!
//! - **Correlation ID tracking**: extract or generate a correlation id, run the
//!   request inside an `http_request` span, echo the id on the response
//! - **Admission control**: reject callers over their sliding-window budget
//!   with 429 before any handler runs
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware::from_fn_with_state};
//! use tunestream_web::middleware::{admit, correlation_id_layer};
//!
//! let app = Router::new()
//!     .route("/api/content/*rest", any(proxy))
//!     .layer(from_fn_with_state(limiter, admit))
//!     .layer(correlation_id_layer());
//! ```

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use tunestream_runtime::AdmissionLimiter;
use uuid::Uuid;

use crate::error::AppError;
use crate::extractors::client_ip;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Create a layer that adds correlation ID tracking to all requests.
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// Layer for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Middleware service for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let correlation_id = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        req.extensions_mut().insert(correlation_id);

        let span = tracing::info_span!(
            "http_request",
            correlation_id = %correlation_id,
            method = %req.method(),
            uri = %req.uri(),
        );

        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.instrument(span).await?;

            if let Ok(header_value) = HeaderValue::from_str(&correlation_id.to_string()) {
                response
                    .headers_mut()
                    .insert(CORRELATION_ID_HEADER, header_value);
            }

            Ok(response)
        })
    }
}

/// Admission gate keyed by client IP.
///
/// Use with `axum::middleware::from_fn_with_state(limiter, admit)`. Layers
/// stack: a route behind both the global and a sensitive limiter consumes
/// budget from each.
pub async fn admit(
    State(limiter): State<Arc<AdmissionLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let key = client_ip(req.headers(), req.extensions()).to_string();
    if limiter.allow(&key) {
        next.run(req).await
    } else {
        AppError::too_many_requests().into_response()
    }
}
