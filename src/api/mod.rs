// src/api/mod.rs

//! Remote API ports and the GraphQL transport implementation.
//!
//! The crawl engine only depends on the [`Transport`] and [`TokenProvider`]
//! traits. Errors cross this boundary as a tagged [`FetchError`] kind so the
//! orchestrator can branch retry behavior with an exhaustive match instead of
//! inspecting error chains.

mod client;
mod queries;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Page, ProjectDetails};

pub use client::GraphTransport;

/// Failure kinds a transport call can produce.
///
/// Timeouts and network-level failures are `Other`; only an explicit
/// credential rejection is `Auth` and only a server throttle is `RateLimit`.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// Credentials rejected by the server
    #[error("auth error: {0}")]
    Auth(String),

    /// Server-imposed throttle
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    /// Network, timeout, or unexpected failure
    #[error("transport error: {0}")]
    Other(String),
}

/// Result type for transport calls.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Port for the remote paginated API.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch one page of the project listing starting after `cursor`.
    async fn fetch_page(&self, cursor: Option<&str>, limit: usize) -> FetchResult<Page>;

    /// Fetch the full detail record for a single project.
    async fn fetch_details(&self, slug: &str) -> FetchResult<ProjectDetails>;
}

/// Port for interactive token escalation.
///
/// Invoked only after an auth error. The crawl suspends until this returns;
/// `None` means the operator declined and the crawl stops cleanly.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn request_token(&self) -> Option<String>;
}

/// Shared auth token slot.
///
/// The transport reads the current token when building request headers; a
/// token provider installs fresh tokens here before the orchestrator retries.
#[derive(Clone, Default)]
pub struct TokenCache {
    inner: Arc<Mutex<Option<String>>>,
}

impl TokenCache {
    pub fn new(token: Option<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(token)),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.inner.lock().expect("token cache poisoned").clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.inner.lock().expect("token cache poisoned") = Some(token.into());
    }

    /// Drop the cached token after the server rejects it.
    pub fn clear(&self) {
        *self.inner.lock().expect("token cache poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cache_roundtrip() {
        let cache = TokenCache::default();
        assert!(cache.get().is_none());

        cache.set("abc");
        assert_eq!(cache.get().as_deref(), Some("abc"));

        cache.clear();
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_token_cache_is_shared() {
        let cache = TokenCache::new(Some("initial".into()));
        let clone = cache.clone();
        clone.set("replaced");
        assert_eq!(cache.get().as_deref(), Some("replaced"));
    }
}
