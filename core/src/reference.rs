//! Foreign-reference validation.
//!
//! Before committing a write that points at an entity owned by another service
//! (rating a song, subscribing to an artist) the owning service is asked whether
//! the entity exists. The answer has three outcomes because "the dependency is
//! shedding load" and "the entity does not exist" map to different responses
//! (503 and 404).

use std::future::Future;
use std::pin::Pin;

/// Result of a reference check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reference {
    /// The entity exists.
    Exists,
    /// The entity does not exist, or its owner could not be reached after
    /// retries (conservative fallback).
    Missing,
    /// The owner's circuit breaker is open; nothing was asked.
    Unavailable,
}

impl Reference {
    /// `true` only for [`Reference::Exists`].
    #[must_use]
    pub const fn exists(self) -> bool {
        matches!(self, Self::Exists)
    }
}

/// Checks whether an entity id is known to its owning service.
pub trait ReferenceCheck: Send + Sync {
    /// Check `id`. Never fails; transport problems fold into the outcome.
    fn check<'a>(&'a self, id: &'a str) -> Pin<Box<dyn Future<Output = Reference> + Send + 'a>>;
}
