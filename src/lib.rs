//! # splitbot-cache
//!
//! Response caching and data-retention core for a conversational
//! bill-splitting assistant.
//!
//! ## Features
//!
//! - Adaptive response cache: TTL depends on model cost tier, response size
//!   and the time-of-day load in the request's region
//! - Fail-open cache path: a backend outage reads as a miss
//! - Consent ledger with default-deny and per-purpose records
//! - Memory store with per-category retention windows, erasure and export
//! - Expiry reconciler that repairs keys missing a native TTL
//! - Advisory cost optimizer with an audit trail
//! - Pluggable key-value backends (in-memory, null, Redis)
//!
//! ## Response Cache
//!
//! ```no_run
//! use splitbot_cache::{AssistantCore, CachedResponse, CoreConfig, RequestDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let core = AssistantCore::from_config(CoreConfig::from_env()?).await?;
//!
//!     let request = RequestDescriptor::new("BR", "gpt-4o-mini", "Divide R$ 90 entre 3 amigos");
//!     if core.get_cached(&request).await.is_none() {
//!         let answer = CachedResponse::new("R$ 30 para cada um", 18, "gpt-4o-mini");
//!         let decision = core.put_cached(&request, answer).await;
//!         println!("cached for {}s ({})", decision.ttl_seconds, decision.rule);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Consent-Gated Memory
//!
//! Memory writes fail with [`CoreError::ConsentDenied`] until the user has
//! granted the purpose that covers the category.
//!
//! ```no_run
//! use splitbot_cache::{AssistantCore, ConsentPurpose, ConsentRecord, CoreConfig, MemoryCategory};
//! use splitbot_cache::retention::RetentionPolicy;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let core = AssistantCore::from_config(CoreConfig::production()).await?;
//!
//!     let grant = ConsentRecord::granted(
//!         "user-42",
//!         ConsentPurpose::MemoryRetention,
//!         chrono::Utc::now(),
//!         &RetentionPolicy::standard(),
//!     );
//!     core.set_consent(&grant).await?;
//!
//!     let id = core
//!         .write_memory("user-42", MemoryCategory::Conversation, json!({"group": "praia"}))
//!         .await?;
//!     let record = core.read_memory("user-42", &id).await?;
//!     println!("expires at {}", record.expires_at);
//!
//!     // Right to erasure
//!     core.erase_user("user-42").await?;
//!     assert!(core.export_user("user-42").await?.is_empty());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod clock;
pub mod config;
pub mod cost;
pub mod error;
pub mod metrics;
pub mod retention;
pub mod service;
pub mod tasks;
pub mod telemetry;
pub mod timing;

// Re-export main types for convenience
pub use backend::{InMemoryBackend, KeyTtl, KvBackend, NullBackend};
pub use cache::{CacheConfig, CacheStore, CachedResponse, Channel, RequestDescriptor, TtlPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackendKind, CoreConfig, Environment};
pub use cost::{ComplexityScorer, CostOptimizer, OptimizationDecision, OptimizationRequest, UserTier};
pub use error::{CoreError, Result};
pub use metrics::{MetricsRecorder, MetricsSink, MetricsSnapshot};
pub use retention::{
    ConsentPurpose, ConsentRecord, DataCategory, ErasureReport, MemoryCategory, MemoryRecord,
    ReconcileReport, UserBundle,
};
pub use service::{AssistantCore, Backends};
pub use tasks::{BackgroundQueue, TaskOutcome};
pub use timing::TimeWindowClassifier;
