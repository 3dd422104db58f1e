//! Offline request cache: the native stand-in for the web app's service
//! worker.
//!
//! The worker runs as its own task and shares nothing with callers except
//! the [`CacheStorage`]. Callers talk to it through a [`WorkerHandle`]
//! (events in, replies and [`ClientMessage`] broadcasts out).
//!
//! - API requests are network-first, falling back to the cached response or
//!   a JSON `503`.
//! - Everything else is cache-first with background revalidation, falling
//!   back to the cached `index.html` for HTML requests or a `503`.

mod network;
mod worker;

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use reqwest::Method;

pub use network::{HttpNetwork, Network};
pub use worker::{
    forward_sync_requests, spawn_worker, ClientMessage, SyncDispatch, SyncTag, WorkerHandle,
    WorkerState,
};

/// Pre-cached application shell.
pub const SHELL_CACHE: &str = "notely-shell-v1";
/// API responses kept for offline reads.
pub const API_CACHE: &str = "notely-api-v1";
/// Static assets picked up at runtime.
pub const RUNTIME_CACHE: &str = "notely-runtime-v1";
/// Caches that survive activation.
pub const CURRENT_CACHES: [&str; 3] = [SHELL_CACHE, API_CACHE, RUNTIME_CACHE];

const OFFLINE_MESSAGE: &str = "You are offline and no cached copy is available";

/// Outgoing request as seen by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineRequest {
    pub method: Method,
    pub url: String,
    pub accept: Option<String>,
}

impl OfflineRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            accept: None,
        }
    }

    #[must_use]
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn accepts_html(&self) -> bool {
        self.accept
            .as_deref()
            .is_some_and(|accept| accept.contains("text/html"))
    }
}

/// A response as stored in, or served from, the caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.map(ToString::to_string),
            body: body.into(),
        }
    }

    /// Synthesized API reply used when neither network nor cache can answer.
    pub fn offline_json() -> Self {
        let body = serde_json::json!({
            "error": true,
            "message": OFFLINE_MESSAGE,
            "data": [],
        });
        Self::new(503, Some("application/json"), body.to_string())
    }

    /// Plain `503` for static assets.
    pub fn service_unavailable() -> Self {
        Self::new(503, Some("text/plain"), OFFLINE_MESSAGE)
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Named response caches shared between the worker and its clients.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    caches: Arc<RwLock<BTreeMap<String, HashMap<String, CachedResponse>>>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, cache: &str, url: &str, response: CachedResponse) {
        let mut caches = self.caches.write().unwrap_or_else(PoisonError::into_inner);
        caches
            .entry(cache.to_string())
            .or_default()
            .insert(url.to_string(), response);
    }

    /// Store several responses at once.
    pub fn put_all(&self, cache: &str, responses: Vec<(String, CachedResponse)>) {
        let mut caches = self.caches.write().unwrap_or_else(PoisonError::into_inner);
        caches.entry(cache.to_string()).or_default().extend(responses);
    }

    pub fn match_in(&self, cache: &str, url: &str) -> Option<CachedResponse> {
        let caches = self.caches.read().unwrap_or_else(PoisonError::into_inner);
        caches.get(cache)?.get(url).cloned()
    }

    /// Look a URL up across every cache.
    pub fn match_any(&self, url: &str) -> Option<CachedResponse> {
        let caches = self.caches.read().unwrap_or_else(PoisonError::into_inner);
        caches.values().find_map(|entries| entries.get(url).cloned())
    }

    pub fn cache_names(&self) -> Vec<String> {
        let caches = self.caches.read().unwrap_or_else(PoisonError::into_inner);
        caches.keys().cloned().collect()
    }

    /// Delete a whole cache. Returns whether it existed.
    pub fn delete(&self, cache: &str) -> bool {
        let mut caches = self.caches.write().unwrap_or_else(PoisonError::into_inner);
        caches.remove(cache).is_some()
    }

    pub fn entry_count(&self, cache: &str) -> usize {
        let caches = self.caches.read().unwrap_or_else(PoisonError::into_inner);
        caches.get(cache).map_or(0, HashMap::len)
    }
}
