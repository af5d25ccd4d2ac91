//! # Tunestream Runtime
//!
//! Resilience primitives shared by the Tunestream services.
//!
//! ## Core Components
//!
//! - **Circuit Breaker**: three-state failure governor around one dependency
//! - **Retry**: bounded retry with fixed or exponential backoff
//! - **Admission Limiter**: per-key sliding-window request counter
//! - **Metrics**: Prometheus recorders for all of the above, plus the event
//!   emitter and subscription fan-out
//!
//! Every component is an explicitly constructed value. Services build one per
//! dependency (or per limited surface) at startup and pass it to the call sites
//! that need it; nothing here is a process-wide singleton except the metrics
//! recorder.

/// Sliding-window admission control
pub mod admission;

/// Circuit breaker pattern for preventing cascading failures
pub mod circuit_breaker;

/// Prometheus metrics for observability
pub mod metrics;

/// Bounded retry with backoff
pub mod retry;

pub use admission::{AdmissionConfig, AdmissionLimiter};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, State};
pub use metrics::{MetricsError, MetricsServer};
pub use retry::{RetryPolicy, retry_with_backoff};
