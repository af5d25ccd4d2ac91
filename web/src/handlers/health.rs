//! Health and metrics endpoints.
//!
//! Used by load balancers and monitoring. Neither endpoint checks downstream
//! dependencies.

use axum::{Json, extract::State, http::StatusCode, http::header, response::IntoResponse};
use serde::Serialize;

use crate::state::{MetricsState, ServiceInfo};

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `ok`.
    pub status: &'static str,
    /// Service role.
    pub service: &'static str,
    /// Build version.
    pub version: &'static str,
}

/// Liveness check.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// { "status": "ok", "service": "ratings", "version": "0.1.0" }
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check(State(info): State<ServiceInfo>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: info.service,
        version: info.version,
    })
}

/// Prometheus scrape endpoint.
///
/// 404 when this process did not install the recorder.
#[allow(clippy::unused_async)]
pub async fn metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    match state.server.render() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
