//! Fire-and-forget delivery of domain events.
//!
//! The catalog calls [`EventEmitter::emit`] after a write has committed. The
//! event is serialized on the caller's task, then a detached tokio task POSTs it
//! to `{target}/events` once, with its own timeout. Any 2xx is success;
//! everything else is logged and dropped. There is no retry, queue or
//! persistence: delivery is at most once.
//!
//! The delivery task is not tied to the request that triggered it. Dropping or
//! cancelling the caller (or the returned [`JoinHandle`]) does not cancel an
//! in-flight delivery.
//!
//! A semaphore bounds the number of deliveries in flight. When it is exhausted
//! new events are dropped immediately instead of queueing.

use crate::{ClientError, endpoint, http_client};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tunestream_core::{DomainEvent, EventError, EventPublisher};
use tunestream_runtime::metrics::EmitterMetrics;

/// Default cap on concurrent deliveries.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// How a single delivery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The receiver answered 2xx.
    Delivered,
    /// The receiver answered with a non-2xx status.
    Rejected {
        /// Status received.
        status: u16,
    },
    /// Transport error or timeout.
    Failed(String),
}

/// Reasons an event was not handed to a delivery task.
#[derive(Error, Debug)]
pub enum EmitError {
    /// Too many deliveries already in flight.
    #[error("Event emitter saturated, dropping {0} event")]
    Saturated(&'static str),

    /// The event could not be serialized.
    #[error(transparent)]
    Encode(#[from] EventError),
}

/// Publishes domain events to another service's `/events` endpoint.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    client: reqwest::Client,
    events_url: Url,
    in_flight: Arc<Semaphore>,
}

impl EventEmitter {
    /// Emit to `{target_base_url}/events` with a per-delivery `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(target_base_url: &str, timeout: Duration, max_in_flight: usize) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(timeout)?,
            events_url: endpoint(target_base_url, "events")?,
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
        })
    }

    /// The delivery endpoint.
    #[must_use]
    pub const fn events_url(&self) -> &Url {
        &self.events_url
    }

    /// Start delivering `event` in the background and return immediately.
    ///
    /// Must be called from within a tokio runtime. Awaiting the returned handle
    /// is optional.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::Saturated`] if the in-flight cap is reached and
    /// [`EmitError::Encode`] if the event cannot be serialized. Both are logged.
    pub fn emit(&self, event: &DomainEvent) -> Result<JoinHandle<Delivery>, EmitError> {
        let kind = event.kind().as_str();

        let Ok(permit) = Arc::clone(&self.in_flight).try_acquire_owned() else {
            EmitterMetrics::record_dropped(kind);
            tracing::warn!(event_type = kind, subject = %event.subject_id(), "Event emitter saturated, dropping event");
            return Err(EmitError::Saturated(kind));
        };

        let body = event.encode().inspect_err(|error| {
            tracing::error!(event_type = kind, error = %error, "Failed to encode event");
        })?;
        let subject = event.subject_id().to_owned();
        let client = self.client.clone();
        let url = self.events_url.clone();

        Ok(tokio::spawn(async move {
            let _permit = permit;
            let started = Instant::now();
            let result = client
                .post(url.clone())
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    EmitterMetrics::record_delivered(kind, started.elapsed());
                    tracing::debug!(event_type = kind, subject = %subject, url = %url, "Event delivered");
                    Delivery::Delivered
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    EmitterMetrics::record_failed(kind);
                    tracing::warn!(event_type = kind, subject = %subject, url = %url, status, "Event rejected by receiver");
                    Delivery::Rejected { status }
                }
                Err(error) => {
                    EmitterMetrics::record_failed(kind);
                    let cause = if error.is_timeout() {
                        "timeout"
                    } else if error.is_connect() {
                        "connect"
                    } else {
                        "transport"
                    };
                    tracing::warn!(
                        event_type = kind,
                        subject = %subject,
                        url = %url,
                        cause,
                        error = %error,
                        "Event delivery failed"
                    );
                    Delivery::Failed(error.to_string())
                }
            }
        }))
    }
}

impl EventPublisher for EventEmitter {
    fn publish(&self, event: DomainEvent) {
        // Errors are logged inside emit; the handle is detached.
        let _ = self.emit(&event);
    }
}
