//! Prometheus metrics for the resilience and fan-out components.
//!
//! Recorders are zero-sized structs with associated functions so call sites read
//! `AdmissionMetrics::record_rejected("gateway")`. They go through the `metrics`
//! facade and are no-ops until [`MetricsServer::start`] installs the Prometheus
//! recorder.
//!
//! Covered components:
//! - Circuit breakers (per breaker name)
//! - Existence-probe retries
//! - Admission limiters (per limiter name)
//! - Event emitter
//! - Subscription fan-out
//!
//! # Example
//!
//! ```rust,no_run
//! use tunestream_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new();
//! server.start()?;
//!
//! // Served by the web layer at GET /metrics
//! let _text = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the handle used to render the scrape output.
#[derive(Default)]
pub struct MetricsServer {
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create an unstarted server.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g. by another test), this logs a
    /// warning, returns `Ok`, and [`render`](Self::render) yields `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Circuit Breaker Metrics
    describe_gauge!(
        "circuit_breaker_state",
        "Current circuit breaker state (0=closed, 1=half-open, 2=open)"
    );
    describe_counter!(
        "circuit_breaker_calls_total",
        "Total number of calls through circuit breaker"
    );
    describe_counter!(
        "circuit_breaker_successes_total",
        "Total number of successful calls"
    );
    describe_counter!(
        "circuit_breaker_failures_total",
        "Total number of failed calls"
    );
    describe_counter!(
        "circuit_breaker_rejections_total",
        "Total number of rejected calls (circuit open)"
    );

    // Retry Metrics
    describe_counter!(
        "probe_attempts_total",
        "Total number of existence probe attempts"
    );
    describe_counter!(
        "probe_exhausted_total",
        "Existence probes that used every attempt without an answer"
    );

    // Admission Metrics
    describe_counter!(
        "admission_admitted_total",
        "Requests admitted by an admission limiter"
    );
    describe_counter!(
        "admission_rejected_total",
        "Requests rejected by an admission limiter"
    );
    describe_gauge!(
        "admission_tracked_keys",
        "Keys holding a non-empty window after the last sweep"
    );

    // Emitter Metrics
    describe_counter!(
        "events_delivered_total",
        "Domain events accepted by the receiving service"
    );
    describe_counter!(
        "events_failed_total",
        "Domain events lost to transport errors or non-2xx answers"
    );
    describe_counter!(
        "events_dropped_total",
        "Domain events dropped because too many deliveries were in flight"
    );
    describe_histogram!(
        "event_delivery_duration_seconds",
        "Time taken to deliver a domain event"
    );

    // Fan-out Metrics
    describe_counter!(
        "fanout_events_total",
        "Domain events handled by subscription fan-out"
    );
    describe_counter!(
        "fanout_matched_total",
        "Subscriptions matched by fan-out"
    );
    describe_counter!(
        "fanout_dispatched_total",
        "Notifications created by fan-out"
    );
    describe_counter!(
        "fanout_failed_total",
        "Notification dispatches that failed"
    );
}

/// Circuit breaker metrics recorder.
pub struct CircuitBreakerMetrics;

impl CircuitBreakerMetrics {
    /// Record circuit breaker state.
    ///
    /// 0 = Closed, 1 = `HalfOpen`, 2 = Open
    pub fn record_state(breaker: &str, state: f64) {
        gauge!("circuit_breaker_state", "breaker" => breaker.to_owned()).set(state);
    }

    /// Record a call attempt.
    pub fn record_call(breaker: &str) {
        counter!("circuit_breaker_calls_total", "breaker" => breaker.to_owned()).increment(1);
    }

    /// Record a successful call.
    pub fn record_success(breaker: &str) {
        counter!("circuit_breaker_successes_total", "breaker" => breaker.to_owned()).increment(1);
    }

    /// Record a failed call.
    pub fn record_failure(breaker: &str) {
        counter!("circuit_breaker_failures_total", "breaker" => breaker.to_owned()).increment(1);
    }

    /// Record a rejected call (circuit open).
    pub fn record_rejection(breaker: &str) {
        counter!("circuit_breaker_rejections_total", "breaker" => breaker.to_owned()).increment(1);
    }
}

/// Existence-probe retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record one probe attempt against `target`.
    pub fn record_attempt(target: &str) {
        counter!("probe_attempts_total", "target" => target.to_owned()).increment(1);
    }

    /// Record a probe that used all its attempts.
    pub fn record_exhausted(target: &str) {
        counter!("probe_exhausted_total", "target" => target.to_owned()).increment(1);
    }
}

/// Admission limiter metrics recorder.
pub struct AdmissionMetrics;

impl AdmissionMetrics {
    /// Record an admitted request.
    pub fn record_admitted(limiter: &str) {
        counter!("admission_admitted_total", "limiter" => limiter.to_owned()).increment(1);
    }

    /// Record a rejected request.
    pub fn record_rejected(limiter: &str) {
        counter!("admission_rejected_total", "limiter" => limiter.to_owned()).increment(1);
    }

    /// Record how many keys survived a sweep.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_tracked_keys(limiter: &str, keys: usize) {
        gauge!("admission_tracked_keys", "limiter" => limiter.to_owned()).set(keys as f64);
    }
}

/// Event emitter metrics recorder.
pub struct EmitterMetrics;

impl EmitterMetrics {
    /// Record a delivered event.
    pub fn record_delivered(kind: &'static str, duration: Duration) {
        counter!("events_delivered_total", "type" => kind).increment(1);
        histogram!("event_delivery_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a failed delivery.
    pub fn record_failed(kind: &'static str) {
        counter!("events_failed_total", "type" => kind).increment(1);
    }

    /// Record an event dropped before delivery started.
    pub fn record_dropped(kind: &'static str) {
        counter!("events_dropped_total", "type" => kind).increment(1);
    }
}

/// Subscription fan-out metrics recorder.
pub struct FanOutMetrics;

impl FanOutMetrics {
    /// Record one handled event and how many subscriptions it matched.
    pub fn record_event(kind: &'static str, matched: usize) {
        counter!("fanout_events_total", "type" => kind).increment(1);
        counter!("fanout_matched_total", "type" => kind).increment(matched as u64);
    }

    /// Record a created notification.
    pub fn record_dispatched(kind: &'static str) {
        counter!("fanout_dispatched_total", "type" => kind).increment(1);
    }

    /// Record a failed dispatch.
    pub fn record_failed(kind: &'static str) {
        counter!("fanout_failed_total", "type" => kind).increment(1);
    }
}
