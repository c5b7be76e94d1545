//! Key-value backends
//!
//! The cache and the retention stores talk to storage only through
//! [`KvBackend`]: get, set with an optional native expiration, delete,
//! scan by prefix, remaining TTL and expire. Three implementations ship:
//!
//! - [`InMemoryBackend`]: process-local map, honours TTLs against a [`Clock`](crate::clock::Clock)
//! - [`NullBackend`]: explicit degraded mode, reads miss and writes fail
//! - `RedisBackend`: production backend (feature `redis-backend`)

pub mod memory;
pub mod null;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use memory::InMemoryBackend;
pub use null::NullBackend;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisBackend;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Expiration state of a key as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist (or already expired)
    Missing,
    /// Key exists without a native expiration
    Persistent,
    /// Key expires after the given duration
    Expires(Duration),
}

impl KeyTtl {
    /// Whether the key exists but carries no expiration
    pub fn is_persistent(&self) -> bool {
        matches!(self, KeyTtl::Persistent)
    }
}

/// Async key-value store with per-key expiration
///
/// Every write is atomic at the backend: a caller that abandons a future
/// either sees the write fully applied or not at all.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Fetch a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, replacing any previous one. `ttl = None` stores without expiration.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Delete a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// List live keys starting with `prefix`
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remaining lifetime of a key
    async fn ttl_remaining(&self, key: &str) -> Result<KeyTtl>;

    /// Attach an expiration to an existing key, returning whether the key existed
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Fast existence probe
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(!matches!(self.ttl_remaining(key).await?, KeyTtl::Missing))
    }
}
