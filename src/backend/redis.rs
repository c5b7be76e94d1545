//! Redis backend
//!
//! Uses a multiplexed `ConnectionManager`, which reconnects on its own;
//! every command is a single round trip so writes are atomic per key.

use crate::backend::{KeyTtl, KvBackend};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

fn unavailable(e: redis::RedisError) -> CoreError {
    CoreError::BackendUnavailable(e.to_string())
}

/// Escape glob metacharacters so a prefix scans literally
fn glob_escape(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('*');
    out
}

/// Whole seconds, rounded up, never zero (Redis rejects `EX 0`)
fn ceil_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

/// Redis-backed key-value store
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
}

impl RedisBackend {
    /// Connect to the Redis instance at `url` (e.g. `redis://127.0.0.1:6379`)
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CoreError::ConfigError(format!("invalid redis url: {}", e)))?;
        let manager = ConnectionManager::new(client).await.map_err(unavailable)?;
        info!("Connected to redis backend");
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut con = self.manager.clone();
        con.get::<_, Option<String>>(key).await.map_err(unavailable)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut con = self.manager.clone();
        match ttl {
            Some(ttl) => con
                .set_ex::<_, _, ()>(key, value, ceil_secs(ttl))
                .await
                .map_err(unavailable),
            None => con.set::<_, _, ()>(key, value).await.map_err(unavailable),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut con = self.manager.clone();
        let removed: i64 = con.del(key).await.map_err(unavailable)?;
        Ok(removed > 0)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut con = self.manager.clone();
        let mut keys = Vec::new();
        {
            let mut iter: redis::AsyncIter<String> = con
                .scan_match(glob_escape(prefix))
                .await
                .map_err(unavailable)?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn ttl_remaining(&self, key: &str) -> Result<KeyTtl> {
        let mut con = self.manager.clone();
        let millis: i64 = con.pttl(key).await.map_err(unavailable)?;
        Ok(match millis {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            ms => KeyTtl::Expires(Duration::from_millis(ms.max(0) as u64)),
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut con = self.manager.clone();
        let secs = i64::try_from(ceil_secs(ttl)).unwrap_or(i64::MAX);
        con.expire::<_, bool>(key, secs).await.map_err(unavailable)
    }
}
