//! Process-local backend with TTL support

use crate::backend::{KeyTtl, KvBackend};
use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory key-value store
///
/// Expired keys are invisible to every operation and are physically
/// removed lazily on the next access. Availability can be toggled off to
/// exercise fail-open and fail-loud paths.
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, StoredValue>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl InMemoryBackend {
    /// Create a backend driven by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a backend that evaluates expirations against `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage (`false`) or recovery (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries.values().filter(|v| !v.is_expired(now)).count()
    }

    /// Whether no live keys remain
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::BackendUnavailable(
                "in-memory backend marked unavailable".to_string(),
            ))
        }
    }

    fn deadline(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(stored) if !stored.is_expired(now) => return Ok(Some(stored.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: drop it physically
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|s| s.is_expired(now)) {
            debug!("Dropping expired key: {}", key);
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.check_available()?;
        let expires_at = ttl.map(|t| self.deadline(t));
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some_and(|s| !s.is_expired(now)))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.check_available()?;
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, v)| k.starts_with(prefix) && !v.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ttl_remaining(&self, key: &str) -> Result<KeyTtl> {
        self.check_available()?;
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(match entries.get(key) {
            None => KeyTtl::Missing,
            Some(s) if s.is_expired(now) => KeyTtl::Missing,
            Some(StoredValue {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(StoredValue {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expires((*at - now).to_std().unwrap_or(Duration::ZERO)),
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        let now = self.clock.now();
        let deadline = self.deadline(ttl);
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(stored) if !stored.is_expired(now) => {
                stored.expires_at = Some(deadline);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
