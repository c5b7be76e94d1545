//! Cache entry with TTL metadata

use crate::cache::types::{CacheKey, CacheValue};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A cache entry as persisted in the backend
///
/// The backend carries a native TTL for the same lifetime; the stored
/// `created_at` and `ttl_seconds` let the store refuse a stale entry even if
/// the backend has not evicted it yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cache key
    pub key: CacheKey,

    /// The cached value
    pub value: CacheValue,

    /// When the entry was stored
    pub created_at: DateTime<Utc>,

    /// Lifetime in seconds, always positive
    pub ttl_seconds: u64,

    /// Size of the value in bytes
    pub size_bytes: usize,
}

impl CacheEntry {
    /// Create an entry; a zero TTL is raised to one second
    pub fn new(key: CacheKey, value: CacheValue, created_at: DateTime<Utc>, ttl_seconds: u64) -> Self {
        let size_bytes = value.len();
        Self {
            key,
            value,
            created_at,
            ttl_seconds: ttl_seconds.max(1),
            size_bytes,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Check if the entry has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Time left before expiry, `None` once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        if self.is_expired_at(now) {
            None
        } else {
            (self.expires_at() - now).to_std().ok()
        }
    }
}
