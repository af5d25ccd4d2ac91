//! # Tunestream Clients
//!
//! reqwest-based implementations of the collaborator traits in
//! `tunestream-core`, used when the data or behavior lives in another service.
//!
//! - [`existence`]: existence probes with bounded retry, optionally behind a
//!   circuit breaker ([`ReferenceCheck`](tunestream_core::ReferenceCheck))
//! - [`emitter`]: fire-and-forget domain event delivery
//!   ([`EventPublisher`](tunestream_core::EventPublisher))
//! - [`notifications`]: notification creation
//!   ([`NotificationSink`](tunestream_core::NotificationSink))
//! - [`remote`]: read-only catalog and subscription directories over HTTP
//!
//! Every client owns a `reqwest::Client` with a request timeout; timeouts are the
//! only cancellation mechanism.

use reqwest::Url;
use std::time::Duration;
use thiserror::Error;

pub mod emitter;
pub mod existence;
pub mod notifications;
pub mod remote;

pub use emitter::{Delivery, EmitError, EventEmitter};
pub use existence::{GuardedExistenceClient, HttpExistenceClient, ProbeError, ProbeTarget};
pub use notifications::HttpNotificationSink;
pub use remote::{RemoteCatalog, RemoteSubscriptions};

/// Errors raised while constructing a client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The underlying HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),

    /// A configured service URL is not usable as a base URL.
    #[error("Invalid service URL {url}: {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Build an HTTP client with a whole-request `timeout`.
///
/// # Errors
///
/// Returns [`ClientError::Build`] if the TLS backend cannot be initialised.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ClientError> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("tunestream/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Parse `base` and append `path` segments to it.
///
/// `endpoint("http://content:8002/", "songs/exists")` yields
/// `http://content:8002/songs/exists`.
///
/// # Errors
///
/// Returns [`ClientError::InvalidUrl`] if `base` is not an absolute http(s) URL.
pub fn endpoint(base: &str, path: &str) -> Result<Url, ClientError> {
    let invalid = |reason: String| ClientError::InvalidUrl {
        url: base.to_string(),
        reason,
    };
    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    url.path_segments_mut()
        .map_err(|()| invalid("cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(path.split('/').filter(|segment| !segment.is_empty()));
    Ok(url)
}
