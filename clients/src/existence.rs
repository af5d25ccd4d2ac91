//! Existence probes: "does entity X exist in service Y".
//!
//! A probe is a single GET against the owning service, retried with a fixed
//! backoff on transport errors and non-success statuses. When every attempt
//! fails the caller gets a conservative "does not exist".
//!
//! Two probe shapes are supported:
//!
//! | target | request | exists when |
//! |---|---|---|
//! | [`ProbeTarget::ExistsQuery`] | `GET {base}/{path}?id={id}` | 200 with `{"exists": true}` |
//! | [`ProbeTarget::ResourcePath`] | `GET {base}/{path}/{id}` | 200 |
//!
//! A decoded `{"exists": false}` is a definitive answer and is not retried.
//!
//! [`GuardedExistenceClient`] wraps a probe in a [`CircuitBreaker`]. Only an
//! unreachable dependency counts as a breaker failure; a genuine "not found" is
//! a healthy answer. Callers see three outcomes ([`Reference`]) so that an open
//! breaker (503) is never confused with a miss (404).

use crate::{ClientError, endpoint, http_client};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tunestream_core::{Reference, ReferenceCheck};
use tunestream_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use tunestream_runtime::metrics::RetryMetrics;
use tunestream_runtime::retry::{RetryPolicy, retry_with_backoff};

/// Shape of the probe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTarget {
    /// `GET {base}/{path}?id={id}` answering `{"exists": bool}`.
    ExistsQuery {
        /// Path below the service base, e.g. `songs/exists`.
        path: String,
    },
    /// `GET {base}/{path}/{id}`, where 200 means the entity exists.
    ResourcePath {
        /// Collection path below the service base, e.g. `artists`.
        path: String,
    },
}

impl ProbeTarget {
    /// `GET {base}/songs/exists?id=`
    #[must_use]
    pub fn songs() -> Self {
        Self::ExistsQuery {
            path: "songs/exists".to_string(),
        }
    }

    /// `GET {base}/artists/{id}`
    #[must_use]
    pub fn artists() -> Self {
        Self::ResourcePath {
            path: "artists".to_string(),
        }
    }

    fn path(&self) -> &str {
        match self {
            Self::ExistsQuery { path } | Self::ResourcePath { path } => path,
        }
    }
}

/// Why a probe produced no positive answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The service answered, but not with 200 (404 for a missing resource).
    #[error("Probe answered with status {status}")]
    Status {
        /// HTTP status of the last attempt.
        status: u16,
    },

    /// Transport failure, timeout, or an undecodable body.
    #[error("Dependency unreachable: {0}")]
    Unreachable(String),
}

impl ProbeError {
    /// `true` when the dependency itself looks unhealthy (transport errors and
    /// 5xx), as opposed to answering that the entity is absent.
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::Status { status } => *status >= 500,
        }
    }
}

#[derive(Deserialize)]
struct ExistsBody {
    exists: bool,
}

/// Existence probe against one resource of one service.
#[derive(Debug, Clone)]
pub struct HttpExistenceClient {
    name: String,
    client: reqwest::Client,
    base: Url,
    target: ProbeTarget,
    policy: RetryPolicy,
}

impl HttpExistenceClient {
    /// Create a probe for `target` under `base_url`. `name` labels logs and
    /// metrics.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        target: ProbeTarget,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            name: name.into(),
            client: http_client(timeout)?,
            base: endpoint(base_url, target.path())?,
            target,
            policy,
        })
    }

    /// Probe name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask whether `id` exists, retrying per the policy.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt when no attempt got a definitive
    /// answer.
    pub async fn probe(&self, id: &str) -> Result<bool, ProbeError> {
        let result = retry_with_backoff(&self.policy, || self.probe_once(id)).await;
        if let Err(error) = &result {
            RetryMetrics::record_exhausted(&self.name);
            tracing::warn!(probe = %self.name, id = %id, error = %error, "Existence probe exhausted");
        }
        result
    }

    /// Ask whether `id` exists. Never fails: anything but a positive answer is
    /// `false`.
    pub async fn exists(&self, id: &str) -> bool {
        self.probe(id).await.unwrap_or(false)
    }

    async fn probe_once(&self, id: &str) -> Result<bool, ProbeError> {
        RetryMetrics::record_attempt(&self.name);

        let request = match &self.target {
            ProbeTarget::ExistsQuery { .. } => self.client.get(self.base.clone()).query(&[("id", id)]),
            ProbeTarget::ResourcePath { .. } => {
                let mut url = self.base.clone();
                url.path_segments_mut()
                    .map_err(|()| ProbeError::Unreachable("base URL cannot carry a path".to_string()))?
                    .push(id);
                self.client.get(url)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| ProbeError::Unreachable(e.to_string()))?;
        let status = response.status();
        tracing::debug!(probe = %self.name, id = %id, status = %status, "Existence probe answered");

        if status != StatusCode::OK {
            return Err(ProbeError::Status {
                status: status.as_u16(),
            });
        }

        match self.target {
            ProbeTarget::ExistsQuery { .. } => response
                .json::<ExistsBody>()
                .await
                .map(|body| body.exists)
                .map_err(|e| ProbeError::Unreachable(format!("undecodable exists body: {e}"))),
            ProbeTarget::ResourcePath { .. } => Ok(true),
        }
    }
}

impl ReferenceCheck for HttpExistenceClient {
    fn check<'a>(&'a self, id: &'a str) -> Pin<Box<dyn Future<Output = Reference> + Send + 'a>> {
        Box::pin(async move {
            if self.exists(id).await {
                Reference::Exists
            } else {
                Reference::Missing
            }
        })
    }
}

/// Existence probe behind a circuit breaker.
#[derive(Debug, Clone)]
pub struct GuardedExistenceClient {
    probe: HttpExistenceClient,
    breaker: CircuitBreaker,
}

impl GuardedExistenceClient {
    /// Guard `probe` with `breaker`.
    #[must_use]
    pub const fn new(probe: HttpExistenceClient, breaker: CircuitBreaker) -> Self {
        Self { probe, breaker }
    }

    /// The breaker in use.
    #[must_use]
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Resolve `id` through the breaker.
    ///
    /// The retry loop runs inside the guarded call, so one exhausted probe is
    /// one breaker failure.
    pub async fn resolve(&self, id: &str) -> Reference {
        let outcome = self
            .breaker
            .call(|| async {
                match self.probe.probe(id).await {
                    Ok(found) => Ok(found),
                    Err(error) if error.is_unreachable() => Err(error),
                    Err(_) => Ok(false),
                }
            })
            .await;

        match outcome {
            Ok(true) => Reference::Exists,
            Ok(false) => Reference::Missing,
            Err(CircuitBreakerError::Open) => {
                tracing::warn!(
                    probe = %self.probe.name(),
                    breaker = %self.breaker.name(),
                    id = %id,
                    "Dependency circuit open, reference not checked"
                );
                Reference::Unavailable
            }
            Err(CircuitBreakerError::Inner(error)) => {
                tracing::warn!(
                    probe = %self.probe.name(),
                    id = %id,
                    error = %error,
                    "Dependency unreachable, treating reference as missing"
                );
                Reference::Missing
            }
        }
    }
}

impl ReferenceCheck for GuardedExistenceClient {
    fn check<'a>(&'a self, id: &'a str) -> Pin<Box<dyn Future<Output = Reference> + Send + 'a>> {
        Box::pin(self.resolve(id))
    }
}
