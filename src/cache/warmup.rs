//! Cache pre-population on the background queue

use crate::cache::store::CacheStore;
use crate::cache::types::{CacheKey, CachedResponse};
use crate::tasks::BackgroundQueue;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// A response to pre-load and its lifetime
#[derive(Debug, Clone)]
pub struct WarmupEntry {
    pub key: CacheKey,
    pub response: CachedResponse,
    pub ttl_seconds: u64,
}

/// Submits warm-up writes as bounded background tasks
pub struct CacheWarmer {
    store: Arc<CacheStore>,
    queue: Arc<BackgroundQueue>,
}

impl CacheWarmer {
    pub fn new(store: Arc<CacheStore>, queue: Arc<BackgroundQueue>) -> Self {
        Self { store, queue }
    }

    /// Queue one task per entry; entries already cached are left untouched
    pub fn warm(&self, entries: Vec<WarmupEntry>) -> Vec<Uuid> {
        entries
            .into_iter()
            .map(|entry| {
                let store = self.store.clone();
                self.queue.submit(format!("warm {}", entry.key), async move {
                    if store.exists(&entry.key).await {
                        debug!("Warm-up skipped, already cached: {}", entry.key);
                    } else {
                        store
                            .set_response(&entry.key, &entry.response, entry.ttl_seconds)
                            .await;
                    }
                    Ok(())
                })
            })
            .collect()
    }
}
