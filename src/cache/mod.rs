//! # Adaptive Response Cache
//!
//! Caches model answers for the bill-splitting assistant. Entry lifetimes
//! adapt to what the answer cost and when it was asked for.
//!
//! ## Features
//!
//! - **Deterministic keys**: `cache:{region}:{model}:{hash}` over canonical JSON
//! - **Adaptive TTL**: longer for top-tier models and large answers, shorter at peak hours
//! - **Region-aware peaks**: windows evaluated in the region's civil time zone
//! - **Fail-open**: backend errors read as misses and writes become no-ops
//! - **Warm-up**: pre-population through the bounded background queue
//!
//! ## Example
//!
//! ```rust
//! use splitbot_cache::backend::InMemoryBackend;
//! use splitbot_cache::cache::{CacheStore, CachedResponse, RequestDescriptor, TtlPolicy};
//! use splitbot_cache::clock::{Clock, SystemClock};
//! use splitbot_cache::metrics::MetricsRecorder;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let clock = Arc::new(SystemClock);
//! let store = CacheStore::new(Arc::new(InMemoryBackend::new()), clock.clone(), MetricsRecorder::in_memory());
//! let policy = TtlPolicy::default();
//!
//! let request = RequestDescriptor::new("BR", "gpt-4o-mini", "Divide R$ 120 entre 3 pessoas");
//! let key = request.cache_key();
//! let now_local = clock.now_in(chrono_tz::America::Sao_Paulo);
//! let ttl = policy.compute_ttl(&request.model, 42, &now_local);
//!
//! store.set_response(&key, &CachedResponse::new("R$ 40 cada", 42, "gpt-4o-mini"), ttl).await;
//! assert!(store.get_response(&key).await.is_some());
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod key;
pub mod store;
pub mod ttl;
pub mod types;
pub mod warmup;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::CacheEntry;
pub use key::{canonical_json, derive_key, RequestDescriptor};
pub use store::CacheStore;
pub use ttl::{ModelCostTable, ModelTier, TtlDecision, TtlPolicy, TtlRule};
pub use types::{CacheKey, CacheValue, CachedResponse, Channel};
pub use warmup::{CacheWarmer, WarmupEntry};
