//! Circuit breaker for calls to a single downstream dependency.
//!
//! A circuit breaker counts failures of a dependency and "opens" (stops calling
//! it) once too many accumulate, so a struggling service is not hammered by
//! every request that needs it.
//!
//! # States
//!
//! - **Closed**: Calls pass through. Failures are counted; any success resets
//!   the count to zero.
//! - **Open**: Calls are rejected with [`CircuitBreakerError::Open`] without
//!   invoking the operation.
//! - **HalfOpen**: Once more than `reset_timeout` has passed since the last
//!   failure, a single trial call is let through. Success closes the circuit,
//!   failure reopens it. Other callers are rejected while the trial runs.
//!
//! One breaker is constructed per dependency at startup and shared (`Clone` is
//! cheap) by every call site that talks to that dependency. State lives behind a
//! mutex so concurrent callers always see one consistent state.
//!
//! # Example
//!
//! ```rust
//! use tunestream_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let config = CircuitBreakerConfig::builder()
//!     .max_failures(3)
//!     .reset_timeout(Duration::from_secs(5))
//!     .build();
//!
//! let breaker = CircuitBreaker::new("content", config);
//!
//! match breaker.call(|| async { Ok::<_, String>(42) }).await {
//!     Ok(result) => println!("Success: {result}"),
//!     Err(e) => println!("Failed: {e}"),
//! }
//! # }
//! ```

use crate::metrics::CircuitBreakerMetrics as Recorder;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub max_failures: u32,
    /// Time since the last failure after which an open circuit allows a trial call
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            reset_timeout: Duration::from_secs(5),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub const fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder {
            max_failures: None,
            reset_timeout: None,
        }
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfigBuilder {
    max_failures: Option<u32>,
    reset_timeout: Option<Duration>,
}

impl CircuitBreakerConfigBuilder {
    /// Set the failure threshold.
    ///
    /// Circuit opens after this many consecutive failures. Zero is treated as one.
    #[must_use]
    pub const fn max_failures(mut self, threshold: u32) -> Self {
        self.max_failures = Some(threshold);
        self
    }

    /// Set how long an open circuit waits before allowing a trial call.
    #[must_use]
    pub const fn reset_timeout(mut self, duration: Duration) -> Self {
        self.reset_timeout = Some(duration);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> CircuitBreakerConfig {
        let defaults = CircuitBreakerConfig::default();
        CircuitBreakerConfig {
            max_failures: self.max_failures.unwrap_or(defaults.max_failures).max(1),
            reset_timeout: self.reset_timeout.unwrap_or(defaults.reset_timeout),
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests fail immediately
    Open,
    /// Circuit is half-open, a single trial call decides recovery
    HalfOpen,
}

impl State {
    const fn gauge(self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::HalfOpen => 1.0,
            Self::Open => 2.0,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        })
    }
}

/// Errors from circuit breaker operations.
#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, request rejected without calling the dependency
    #[error("Circuit breaker is open")]
    Open,
    /// Operation failed
    #[error("Operation failed: {0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// `true` if the call was short-circuited.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

#[derive(Debug)]
struct CircuitBreakerState {
    state: State,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker guarding one dependency.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
    // Metrics
    total_calls: Arc<AtomicU64>,
    total_successes: Arc<AtomicU64>,
    total_failures: Arc<AtomicU64>,
    total_rejections: Arc<AtomicU64>,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker for the dependency called `name`.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState {
                state: State::Closed,
                failure_count: 0,
                last_failure_at: None,
                trial_in_flight: false,
            })),
            total_calls: Arc::new(AtomicU64::new(0)),
            total_successes: Arc::new(AtomicU64::new(0)),
            total_failures: Arc::new(AtomicU64::new(0)),
            total_rejections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Name of the guarded dependency.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. An open circuit whose timeout has elapsed still reports
    /// `Open` until the next call moves it to `HalfOpen`.
    #[must_use]
    pub fn state(&self) -> State {
        self.lock().state
    }

    /// Current consecutive failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Call an operation through the circuit breaker.
    ///
    /// If the future is dropped before completing, a half-open trial slot is
    /// released without counting as success or failure.
    ///
    /// # Errors
    ///
    /// Returns `CircuitBreakerError::Open` if the circuit is open.
    /// Returns `CircuitBreakerError::Inner` if the operation fails.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        Recorder::record_call(&self.name);

        let Some(mut attempt) = self.try_begin() else {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            Recorder::record_rejection(&self.name);
            tracing::debug!(breaker = %self.name, "Circuit breaker is OPEN, rejecting request");
            return Err(CircuitBreakerError::Open);
        };

        match operation().await {
            Ok(result) => {
                attempt.settled = true;
                self.on_success(attempt.trial);
                self.total_successes.fetch_add(1, Ordering::Relaxed);
                Recorder::record_success(&self.name);
                Ok(result)
            }
            Err(err) => {
                attempt.settled = true;
                self.on_failure(attempt.trial);
                self.total_failures.fetch_add(1, Ordering::Relaxed);
                Recorder::record_failure(&self.name);
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitBreakerState> {
        // State is updated field by field under the lock; a panic elsewhere cannot
        // leave it half-written, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a call may proceed, moving Open to `HalfOpen` when the
    /// reset timeout has elapsed.
    fn try_begin(&self) -> Option<Attempt<'_>> {
        let mut state = self.lock();

        match state.state {
            State::Closed => Some(Attempt::new(self, false)),
            State::HalfOpen if state.trial_in_flight => None,
            State::HalfOpen => {
                state.trial_in_flight = true;
                Some(Attempt::new(self, true))
            }
            State::Open => {
                let elapsed = state
                    .last_failure_at
                    .is_none_or(|at| at.elapsed() > self.config.reset_timeout);
                if !elapsed {
                    return None;
                }
                tracing::info!(breaker = %self.name, "Circuit breaker transitioning OPEN -> HALF_OPEN");
                state.state = State::HalfOpen;
                state.trial_in_flight = true;
                Recorder::record_state(&self.name, State::HalfOpen.gauge());
                Some(Attempt::new(self, true))
            }
        }
    }

    /// Only a half-open trial may close the circuit. A call admitted while
    /// closed that completes after the circuit opened leaves it untouched.
    fn on_success(&self, trial: bool) {
        let mut state = self.lock();
        if !trial && state.state != State::Closed {
            tracing::debug!(
                breaker = %self.name,
                state = %state.state,
                "Ignoring success of a call admitted before the circuit opened"
            );
            return;
        }

        state.failure_count = 0;
        state.last_failure_at = None;
        if trial {
            state.trial_in_flight = false;
        }

        if state.state != State::Closed {
            tracing::info!(
                breaker = %self.name,
                from = %state.state,
                "Circuit breaker transitioning -> CLOSED"
            );
            state.state = State::Closed;
            Recorder::record_state(&self.name, State::Closed.gauge());
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut state = self.lock();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_at = Some(Instant::now());

        if trial {
            state.trial_in_flight = false;
            tracing::warn!(
                breaker = %self.name,
                failures = state.failure_count,
                "Circuit breaker transitioning HALF_OPEN -> OPEN (trial failed)"
            );
            state.state = State::Open;
            Recorder::record_state(&self.name, State::Open.gauge());
        } else if state.state == State::Closed && state.failure_count >= self.config.max_failures {
            tracing::warn!(
                breaker = %self.name,
                failures = state.failure_count,
                threshold = self.config.max_failures,
                "Circuit breaker transitioning CLOSED -> OPEN"
            );
            state.state = State::Open;
            Recorder::record_state(&self.name, State::Open.gauge());
        }
    }

    /// Get circuit breaker metrics.
    #[must_use]
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
        }
    }

    /// Reset the circuit breaker to closed state.
    ///
    /// Useful for testing or manual intervention.
    pub fn reset(&self) {
        let mut state = self.lock();
        tracing::info!(breaker = %self.name, "Circuit breaker manually reset to CLOSED");
        state.state = State::Closed;
        state.failure_count = 0;
        state.last_failure_at = None;
        state.trial_in_flight = false;
        Recorder::record_state(&self.name, State::Closed.gauge());
    }
}

/// An admitted call. Releases the half-open trial slot if dropped unsettled.
struct Attempt<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Attempt<'a> {
    const fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}

/// Metrics for circuit breaker monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerMetrics {
    /// Total number of calls attempted
    pub total_calls: u64,
    /// Total number of successful calls
    pub total_successes: u64,
    /// Total number of failed calls
    pub total_failures: u64,
    /// Total number of rejected calls (circuit open)
    pub total_rejections: u64,
}

impl CircuitBreakerMetrics {
    /// Calculate success rate (0.0 to 1.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 1.0;
        }
        self.total_successes as f64 / self.total_calls as f64
    }

    /// Calculate rejection rate (0.0 to 1.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rejection_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.total_rejections as f64 / self.total_calls as f64
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn breaker(max_failures: u32, reset_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::builder()
                .max_failures(max_failures)
                .reset_timeout(reset_timeout)
                .build(),
        )
    }

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker.call(|| async { Err::<i32, _>("error") }).await;
    }

    #[tokio::test]
    async fn test_closed_on_success() {
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig::default());

        let result = breaker.call(|| async { Ok::<_, String>(42) }).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(breaker.state(), State::Closed);
    }

    #[tokio::test]
    async fn test_success_while_closed_resets_failures() {
        let breaker = breaker(3, Duration::from_secs(5));
        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.failure_count(), 2);

        let _ = breaker.call(|| async { Ok::<_, String>(()) }).await;
        assert_eq!(breaker.failure_count(), 0);

        // Two more failures do not reach the threshold again
        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), State::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_calling_then_recovers() {
        let breaker = breaker(3, Duration::from_secs(5));
        for _ in 0..3 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.state(), State::Open);

        let invoked = AtomicUsize::new(0);
        let result = breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(1)
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(5_001)).await;

        let result = breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(1)
            })
            .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), State::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_timeout_is_strict() {
        let breaker = breaker(1, Duration::from_secs(5));
        fail(&breaker).await;

        tokio::time::advance(Duration::from_secs(5)).await;
        let result = breaker.call(|| async { Ok::<_, String>(()) }).await;
        assert!(result.unwrap_err().is_open());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(breaker.call(|| async { Ok::<_, String>(()) }).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopens_on_half_open_failure() {
        let breaker = breaker(2, Duration::from_millis(100));
        fail(&breaker).await;
        fail(&breaker).await;

        tokio::time::advance(Duration::from_millis(150)).await;
        fail(&breaker).await;

        assert_eq!(breaker.state(), State::Open);
        assert_eq!(breaker.failure_count(), 3);

        // The failed trial restarted the timeout
        let result = breaker.call(|| async { Ok::<_, String>(()) }).await;
        assert!(result.unwrap_err().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_allows_single_trial() {
        let breaker = breaker(1, Duration::from_millis(100));
        fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(150)).await;

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let trial = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async {
                        wait.await.ok();
                        Ok::<_, String>(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(breaker.state(), State::HalfOpen);

        let concurrent = breaker.call(|| async { Ok::<_, String>(()) }).await;
        assert!(concurrent.unwrap_err().is_open());

        release.send(()).unwrap();
        assert!(trial.await.unwrap().is_ok());
        assert_eq!(breaker.state(), State::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn late_success_does_not_close_open_circuit() {
        let breaker = breaker(2, Duration::from_secs(5));

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let slow = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async {
                        wait.await.ok();
                        Ok::<_, String>(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), State::Open);

        release.send(()).unwrap();
        assert!(slow.await.unwrap().is_ok());
        assert_eq!(breaker.state(), State::Open);
        assert_eq!(breaker.failure_count(), 2);

        // Still inside the reset timeout: the stale success did not clear it
        let rejected = breaker.call(|| async { Ok::<_, String>(()) }).await;
        assert!(rejected.unwrap_err().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trial_releases_slot() {
        let breaker = breaker(1, Duration::from_millis(100));
        fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(150)).await;

        let pending = breaker.call(|| std::future::pending::<Result<(), String>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());
        assert_eq!(breaker.state(), State::HalfOpen);

        assert!(breaker.call(|| async { Ok::<_, String>(()) }).await.is_ok());
        assert_eq!(breaker.state(), State::Closed);
    }

    #[tokio::test]
    async fn test_metrics() {
        let breaker = breaker(10, Duration::from_secs(5));

        for _ in 0..3 {
            let _ = breaker.call(|| async { Ok::<_, String>(42) }).await;
        }
        for _ in 0..2 {
            fail(&breaker).await;
        }

        let metrics = breaker.metrics();
        assert_eq!(metrics.total_calls, 5);
        assert_eq!(metrics.total_successes, 3);
        assert_eq!(metrics.total_failures, 2);
        assert!((metrics.success_rate() - 0.6).abs() < f64::EPSILON);
        assert!(metrics.rejection_rate().abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_reset() {
        let breaker = breaker(2, Duration::from_secs(60));
        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), State::Open);

        breaker.reset();

        assert_eq!(breaker.state(), State::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_state() {
        let breaker = breaker(50, Duration::from_secs(60));
        let mut handles = vec![];

        for _ in 0..100 {
            let breaker = breaker.clone();
            handles.push(tokio::spawn(async move {
                let _ = breaker.call(|| async { Err::<(), _>("down") }).await;
            }));
        }
        for handle in handles {
            handle.await.ok();
        }

        let metrics = breaker.metrics();
        assert_eq!(metrics.total_calls, 100);
        assert_eq!(metrics.total_failures + metrics.total_rejections, 100);
        assert!(metrics.total_failures >= 50);
        assert_eq!(breaker.state(), State::Open);
    }
}
