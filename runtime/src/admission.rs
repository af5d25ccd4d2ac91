//! Sliding-window admission limiter.
//!
//! Gates inbound requests per caller key (usually the client IP) before they
//! reach business logic. Each key keeps the instants of its admitted requests
//! within the trailing window; a request is admitted iff fewer than
//! `max_requests` remain after pruning.
//!
//! ```text
//! max_requests = 3, window = 1s
//!
//! t:     0.0   0.1   0.2   0.3   1.1
//!        ok    ok    ok    429   ok   (0.0 and 0.1 have left the window)
//! ```
//!
//! Rejected requests are not recorded, so a caller hammering a closed window
//! does not extend its own lockout. Keys whose window empties are removed by
//! [`AdmissionLimiter::sweep`], which [`AdmissionLimiter::spawn_sweeper`] runs
//! periodically to bound memory.
//!
//! # Example
//!
//! ```rust
//! use tunestream_runtime::admission::{AdmissionConfig, AdmissionLimiter};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let limiter = AdmissionLimiter::new("gateway", AdmissionConfig::new(2, Duration::from_secs(60)));
//!
//! assert!(limiter.allow("10.0.0.1"));
//! assert!(limiter.allow("10.0.0.1"));
//! assert!(!limiter.allow("10.0.0.1"));
//! assert!(limiter.allow("10.0.0.2"));
//! # }
//! ```

use crate::metrics::AdmissionMetrics;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Admission limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Requests admitted per key within one window
    pub max_requests: u32,
    /// Length of the trailing window
    pub window: Duration,
}

impl AdmissionConfig {
    /// `max_requests` per `window`.
    #[must_use]
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// 100 requests per minute, the gateway's global budget.
    #[must_use]
    pub const fn gateway() -> Self {
        Self::new(100, Duration::from_secs(60))
    }

    /// 10 requests per minute, for login, registration and recovery.
    #[must_use]
    pub const fn sensitive() -> Self {
        Self::new(10, Duration::from_secs(60))
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self::gateway()
    }
}

/// Per-key sliding-window request counter.
#[derive(Debug)]
pub struct AdmissionLimiter {
    name: String,
    config: AdmissionConfig,
    /// key -> admitted instants, oldest first
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl AdmissionLimiter {
    /// Create a limiter. `name` labels logs and metrics.
    #[must_use]
    pub fn new(name: impl Into<String>, config: AdmissionConfig) -> Self {
        Self {
            name: name.into(),
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> AdmissionConfig {
        self.config
    }

    /// Admit or reject one request from `key`.
    #[must_use]
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    pub(crate) fn allow_at(&self, key: &str, now: Instant) -> bool {
        let max = usize::try_from(self.config.max_requests).unwrap_or(usize::MAX);
        let mut windows = self.lock();

        let admitted = match windows.get_mut(key) {
            Some(window) => {
                Self::prune(window, now, self.config.window);
                if window.len() < max {
                    window.push_back(now);
                    true
                } else {
                    false
                }
            }
            None if max > 0 => {
                windows.insert(key.to_owned(), VecDeque::from([now]));
                true
            }
            None => false,
        };
        drop(windows);

        if admitted {
            AdmissionMetrics::record_admitted(&self.name);
        } else {
            AdmissionMetrics::record_rejected(&self.name);
            tracing::debug!(
                limiter = %self.name,
                key = %key,
                max_requests = self.config.max_requests,
                window_ms = u64::try_from(self.config.window.as_millis()).unwrap_or(u64::MAX),
                "Admission rejected"
            );
        }
        admitted
    }

    /// Requests from `key` currently counted against its window.
    #[must_use]
    pub fn in_window(&self, key: &str) -> usize {
        let now = Instant::now();
        let mut windows = self.lock();
        windows.get_mut(key).map_or(0, |window| {
            Self::prune(window, now, self.config.window);
            window.len()
        })
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }

    /// Prune every window and drop keys left empty. Returns how many keys were
    /// removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let window = self.config.window;
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, instants| {
            Self::prune(instants, now, window);
            !instants.is_empty()
        });
        let remaining = windows.len();
        drop(windows);

        AdmissionMetrics::record_tracked_keys(&self.name, remaining);
        let removed = before - remaining;
        if removed > 0 {
            tracing::debug!(limiter = %self.name, removed, remaining, "Swept idle admission keys");
        }
        removed
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the limiter is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                limiter.sweep();
            }
        })
    }

    fn prune(window: &mut VecDeque<Instant>, now: Instant, length: Duration) {
        while window
            .front()
            .is_some_and(|&at| now.saturating_duration_since(at) >= length)
        {
            window.pop_front();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
