//! Fail-open response cache over a [`KvBackend`]
//!
//! A cache outage must never take the assistant down: every backend or
//! decoding error is logged and turned into a miss (reads) or a no-op
//! (writes). Nothing here returns a `Result`.

use crate::backend::KvBackend;
use crate::cache::entry::CacheEntry;
use crate::cache::types::{CacheValue, CachedResponse};
use crate::clock::Clock;
use crate::metrics::MetricsRecorder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Response cache with TTL support
pub struct CacheStore {
    backend: Arc<dyn KvBackend>,
    clock: Arc<dyn Clock>,
    metrics: MetricsRecorder,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn KvBackend>, clock: Arc<dyn Clock>, metrics: MetricsRecorder) -> Self {
        debug!("Initializing response cache on {} backend", backend.name());
        Self {
            backend,
            clock,
            metrics,
        }
    }

    /// Get a value from the cache; errors count as a miss
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("Cache miss: {}", key);
                self.metrics.record_miss();
                return None;
            }
            Err(e) => {
                warn!("Cache read failed for {}, treating as miss: {}", key, e);
                self.metrics.record_miss();
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Undecodable cache entry {}, treating as miss: {}", key, e);
                self.metrics.record_miss();
                return None;
            }
        };

        if entry.is_expired_at(self.clock.now()) {
            debug!("Cache entry expired: {}", key);
            self.metrics.record_miss();
            return None;
        }

        debug!("Cache hit: {}", key);
        self.metrics.record_hit();
        Some(entry.value)
    }

    /// Store a value for `ttl_seconds`; errors are logged and dropped
    pub async fn set(&self, key: &str, value: CacheValue, ttl_seconds: u64) {
        let entry = CacheEntry::new(key.to_string(), value, self.clock.now(), ttl_seconds);
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to encode cache entry {}: {}", key, e);
                return;
            }
        };

        match self
            .backend
            .set(key, &raw, Some(Duration::from_secs(entry.ttl_seconds)))
            .await
        {
            Ok(()) => {
                debug!("Cached {} ({} bytes, ttl {}s)", key, entry.size_bytes, entry.ttl_seconds);
                self.metrics.record_set();
            }
            Err(e) => warn!("Cache write failed for {}, skipping: {}", key, e),
        }
    }

    /// Whether a live entry exists; errors read as `false`
    pub async fn exists(&self, key: &str) -> bool {
        match self.backend.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Cache probe failed for {}: {}", key, e);
                false
            }
        }
    }

    /// Typed read of a model response
    pub async fn get_response(&self, key: &str) -> Option<CachedResponse> {
        let value = self.get(key).await?;
        match serde_json::from_str(&value) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!("Cached value under {} is not a response: {}", key, e);
                None
            }
        }
    }

    /// Typed write of a model response
    pub async fn set_response(&self, key: &str, response: &CachedResponse, ttl_seconds: u64) {
        match serde_json::to_string(response) {
            Ok(value) => self.set(key, value, ttl_seconds).await,
            Err(e) => warn!("Failed to encode response for {}: {}", key, e),
        }
    }
}
