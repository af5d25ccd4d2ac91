//! Gateway reverse proxy.
//!
//! `/api/{users|content|ratings|subscriptions|notifications}/*rest` is
//! forwarded to the matching service as `{upstream}/{rest}?{query}` with the
//! original method, body and headers, minus hop-by-hop headers and the
//! browser's CORS request headers. The gateway owns CORS, so upstream
//! `Access-Control-*` response headers are dropped. A bare
//! `/api/{service}` goes to `{upstream}/{service}`.
//!
//! A transport failure (connect error, timeout) answers 503 in plain text.

use axum::{
    body::{Body, to_bytes},
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderName},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tunestream_runtime::AdmissionLimiter;

use crate::error::AppError;
use crate::middleware::admit;
use crate::state::GatewayState;

/// Largest request body the gateway buffers.
pub const MAX_PROXY_BODY: usize = 10 * 1024 * 1024;

/// Identity routes that also pass the sensitive limiter.
pub const SENSITIVE_PREFIXES: [&str; 4] = [
    "/api/users/register",
    "/api/users/login/",
    "/api/users/password/reset",
    "/api/users/recover/",
];

const HOP_BY_HOP: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

const CORS_REQUEST: [&str; 3] = [
    "origin",
    "access-control-request-method",
    "access-control-request-headers",
];

fn forwardable(name: &HeaderName) -> bool {
    let name = name.as_str();
    !HOP_BY_HOP.contains(&name) && !CORS_REQUEST.contains(&name)
}

fn returnable(name: &HeaderName) -> bool {
    let name = name.as_str();
    !HOP_BY_HOP.contains(&name) && !name.starts_with("access-control-")
}

fn copy_headers(from: &HeaderMap, keep: impl Fn(&HeaderName) -> bool) -> HeaderMap {
    let mut to = HeaderMap::with_capacity(from.len());
    for (name, value) in from {
        if keep(name) {
            to.append(name.clone(), value.clone());
        }
    }
    to
}

/// Whether `path` is one of the sensitive identity routes.
#[must_use]
pub fn is_sensitive(path: &str) -> bool {
    SENSITIVE_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// Apply `limiter` only to [`SENSITIVE_PREFIXES`].
pub async fn sensitive_gate(
    state: State<Arc<AdmissionLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    if is_sensitive(req.uri().path()) {
        admit(state, req, next).await
    } else {
        next.run(req).await
    }
}

/// `ANY /api/:service/*rest` → `{upstream}/{rest}`
pub async fn proxy(
    State(state): State<GatewayState>,
    Path((service, rest)): Path<(String, String)>,
    req: Request,
) -> Result<Response, AppError> {
    forward(&state, &service, &rest, req).await
}

/// `ANY /api/:service` → `{upstream}/{service}`
///
/// Collection routes such as `GET /api/notifications?userId=` name the
/// resource after the service itself.
pub async fn proxy_collection(
    State(state): State<GatewayState>,
    Path(service): Path<String>,
    req: Request,
) -> Result<Response, AppError> {
    forward(&state, &service, &service, req).await
}

async fn forward(
    state: &GatewayState,
    service: &str,
    rest: &str,
    req: Request,
) -> Result<Response, AppError> {
    let upstream = state
        .upstreams
        .resolve(service)
        .ok_or_else(|| AppError::not_found("Service", service))?;

    let mut target = format!(
        "{}/{}",
        upstream.as_str().trim_end_matches('/'),
        rest.trim_start_matches('/')
    );
    if let Some(query) = req.uri().query() {
        target.push('?');
        target.push_str(query);
    }

    let (parts, body) = req.into_parts();
    let body = to_bytes(body, MAX_PROXY_BODY)
        .await
        .map_err(|e| AppError::bad_request("Failed to read request body").with_source(e.into()))?;

    let upstream_response = state
        .client
        .request(parts.method.clone(), &target)
        .headers(copy_headers(&parts.headers, forwardable))
        .body(body)
        .send()
        .await
        .map_err(|error| {
            tracing::warn!(
                service = %service,
                target = %target,
                timeout = error.is_timeout(),
                error = %error,
                "Upstream unreachable"
            );
            AppError::unavailable("Service unavailable")
        })?;

    let status = upstream_response.status();
    let headers = copy_headers(upstream_response.headers(), returnable);
    let bytes = upstream_response.bytes().await.map_err(|error| {
        tracing::warn!(service = %service, error = %error, "Upstream body interrupted");
        AppError::unavailable("Service unavailable")
    })?;

    tracing::debug!(service = %service, method = %parts.method, target = %target, status = %status, "Proxied");

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
