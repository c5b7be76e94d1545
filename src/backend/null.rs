//! Explicit degraded-mode backend
//!
//! Chosen only through configuration. Reads behave as if the store were
//! empty and every write fails with `BackendUnavailable`, so the cache
//! degrades to pass-through while memory and consent writes surface the
//! failure instead of pretending to be durable.

use crate::backend::{KeyTtl, KvBackend};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// Backend that stores nothing
#[derive(Debug)]
pub struct NullBackend {
    _private: (),
}

impl NullBackend {
    /// Create the null backend, announcing the degraded mode
    pub fn new() -> Self {
        warn!(
            "NULL BACKEND SELECTED: cache is pass-through and memory/consent writes will fail"
        );
        Self { _private: () }
    }

    fn rejected(op: &str, key: &str) -> CoreError {
        CoreError::BackendUnavailable(format!("null backend discards {} for {}", op, key))
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, key: &str, _value: &str, _ttl: Option<Duration>) -> Result<()> {
        Err(Self::rejected("set", key))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Err(Self::rejected("delete", key))
    }

    async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn ttl_remaining(&self, _key: &str) -> Result<KeyTtl> {
        Ok(KeyTtl::Missing)
    }

    async fn expire(&self, key: &str, _ttl: Duration) -> Result<bool> {
        Err(Self::rejected("expire", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_miss_and_writes_fail() {
        let backend = NullBackend::new();
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(!backend.exists("k").await.unwrap());
        assert!(backend.scan_prefix("memory:").await.unwrap().is_empty());

        let err = backend.set("k", "v", None).await.unwrap_err();
        assert!(err.is_backend());
        assert!(backend.delete("k").await.is_err());
    }

    #[test]
    fn test_expire_rejected_outside_runtime() {
        let backend = NullBackend::default();
        let result = tokio_test::block_on(backend.expire("k", Duration::from_secs(1)));
        assert!(matches!(result, Err(CoreError::BackendUnavailable(_))));
    }
}
