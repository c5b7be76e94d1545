//! Explicit service context
//!
//! [`AssistantCore`] owns every component and is handed to request handlers
//! by the caller. There are no process-wide singletons.

use crate::backend::{InMemoryBackend, KvBackend, NullBackend};
use crate::cache::{
    derive_key, CacheKey, CacheStore, CacheWarmer, CachedResponse, RequestDescriptor, TtlDecision,
    TtlPolicy, WarmupEntry,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{BackendKind, CoreConfig};
use crate::cost::{
    ComplexityScorer, CostOptimizer, OptimizationAudit, OptimizationDecision, OptimizationRequest,
};
use crate::error::{CoreError, Result};
use crate::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::retention::{
    ConsentLedger, ConsentPurpose, ConsentRecord, DataCategory, ErasureReport, ExpiryReconciler,
    MemoryCategory, MemoryRecord, MemoryStore, Preferences, ReconcileReport, RecordId, UserBundle,
};
use crate::tasks::BackgroundQueue;
use crate::timing::RegionZones;
use chrono::DateTime;
use chrono_tz::Tz;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

/// Storage handles for the two halves of the core
#[derive(Clone)]
pub struct Backends {
    pub cache: Arc<dyn KvBackend>,
    pub memory: Arc<dyn KvBackend>,
}

impl Backends {
    /// Cache and memory share one backend
    pub fn shared(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            cache: backend.clone(),
            memory: backend,
        }
    }
}

/// The caching and retention core
pub struct AssistantCore {
    config: CoreConfig,
    clock: Arc<dyn Clock>,
    zones: RegionZones,
    ttl: TtlPolicy,
    cache: Arc<CacheStore>,
    warmer: CacheWarmer,
    consent: Arc<ConsentLedger>,
    memory: MemoryStore,
    reconciler: Arc<ExpiryReconciler>,
    optimizer: CostOptimizer,
    metrics: MetricsRecorder,
    queue: Arc<BackgroundQueue>,
}

impl AssistantCore {
    /// Wire every component over the given backends
    pub fn new(config: CoreConfig, backends: Backends, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let zones = config.cache.zones().map_err(CoreError::ConfigError)?;
        let policy = config.retention_policy()?;
        let metrics = MetricsRecorder::in_memory();
        let queue = Arc::new(BackgroundQueue::new(config.workers));

        let cache = Arc::new(CacheStore::new(
            backends.cache.clone(),
            clock.clone(),
            metrics.clone(),
        ));
        let consent = Arc::new(ConsentLedger::new(
            backends.memory.clone(),
            policy.clone(),
            config.environment,
            clock.clone(),
        ));
        let memory = MemoryStore::new(
            backends.memory.clone(),
            consent.clone(),
            policy.clone(),
            clock.clone(),
            queue.clone(),
            metrics.clone(),
        );
        let reconciler = Arc::new(ExpiryReconciler::new(
            backends.memory.clone(),
            policy.clone(),
            clock.clone(),
            metrics.clone(),
        ));
        let optimizer = CostOptimizer::new(
            ComplexityScorer::default(),
            config.optimizer.clone(),
            clock.clone(),
            policy.max_age(DataCategory::Analytics),
        );

        info!(
            environment = %config.environment,
            cache_backend = backends.cache.name(),
            memory_backend = backends.memory.name(),
            "Assistant core initialized"
        );

        Ok(Self {
            ttl: TtlPolicy::from_config(&config.cache),
            warmer: CacheWarmer::new(cache.clone(), queue.clone()),
            config,
            clock,
            zones,
            cache,
            consent,
            memory,
            reconciler,
            optimizer,
            metrics,
            queue,
        })
    }

    /// Connect the configured backend and wire the core on the system clock
    pub async fn from_config(config: CoreConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let backend = connect_backend(&config, clock.clone()).await?;
        Self::new(config, Backends::shared(backend), clock)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    pub fn queue(&self) -> &Arc<BackgroundQueue> {
        &self.queue
    }

    // Cache

    /// Look up a cached answer; never fails
    pub async fn get_cached(&self, request: &RequestDescriptor) -> Option<CachedResponse> {
        let region = self.region_of(request);
        self.metrics
            .record_usage(self.is_peak(region), request.channel.is_mobile());
        self.cache.get_response(&self.cache_key(request)).await
    }

    /// Store an answer with an adaptive TTL and report the TTL chosen
    pub async fn put_cached(
        &self,
        request: &RequestDescriptor,
        response: CachedResponse,
    ) -> TtlDecision {
        let decision = self.ttl_for(request, response.tokens);
        self.cache
            .set_response(&self.cache_key(request), &response, decision.ttl_seconds)
            .await;
        decision
    }

    /// Pre-load answers on the background queue
    pub fn warm_cache(&self, items: Vec<(RequestDescriptor, CachedResponse)>) -> Vec<Uuid> {
        let entries = items
            .into_iter()
            .map(|(request, response)| WarmupEntry {
                key: self.cache_key(&request),
                ttl_seconds: self.ttl_for(&request, response.tokens).ttl_seconds,
                response,
            })
            .collect();
        self.warmer.warm(entries)
    }

    pub fn cache_key(&self, request: &RequestDescriptor) -> CacheKey {
        derive_key(self.region_of(request), &request.model, &request.canonical_request())
    }

    /// Whether `region` is currently inside a peak window
    pub fn is_peak(&self, region: &str) -> bool {
        self.ttl.classifier().is_peak(&self.now_local(region))
    }

    fn ttl_for(&self, request: &RequestDescriptor, tokens: u32) -> TtlDecision {
        let now_local = self.now_local(self.region_of(request));
        self.ttl.decide(&request.model, tokens, &now_local)
    }

    fn now_local(&self, region: &str) -> DateTime<Tz> {
        self.clock.now_in(self.zones.zone_for(region))
    }

    fn region_of<'a>(&'a self, request: &'a RequestDescriptor) -> &'a str {
        if request.region.trim().is_empty() {
            &self.config.cache.default_region
        } else {
            &request.region
        }
    }

    // Memory

    pub async fn write_memory(
        &self,
        user_id: &str,
        category: MemoryCategory,
        payload: Value,
    ) -> Result<RecordId> {
        self.memory.write(user_id, category, payload).await
    }

    pub async fn read_memory(&self, user_id: &str, id: &str) -> Result<MemoryRecord> {
        self.memory.read(user_id, id).await
    }

    pub async fn set_preferences(
        &self,
        user_id: &str,
        values: BTreeMap<String, Value>,
    ) -> Result<Preferences> {
        self.memory.set_preferences(user_id, values).await
    }

    pub async fn get_preferences(&self, user_id: &str) -> Result<Preferences> {
        self.memory.get_preferences(user_id).await
    }

    /// Right to portability
    pub async fn export_user(&self, user_id: &str) -> Result<UserBundle> {
        self.memory.export_all(user_id).await
    }

    /// Right to erasure: stored data, consents and optimizer audit entries
    pub async fn erase_user(&self, user_id: &str) -> Result<ErasureReport> {
        let report = self.memory.delete_all(user_id).await?;
        self.optimizer.forget_user(user_id);
        Ok(report)
    }

    // Consent

    pub async fn get_consent(&self, user_id: &str, purpose: ConsentPurpose) -> Result<ConsentRecord> {
        self.consent.get_consent(user_id, purpose).await
    }

    /// Persist a consent decision; a revocation also deletes the data it covered
    pub async fn set_consent(&self, record: &ConsentRecord) -> Result<()> {
        self.consent.set_consent(record).await?;
        if !record.granted {
            self.memory.purge_purpose(&record.user_id, record.purpose).await?;
            if record.purpose == ConsentPurpose::Analytics {
                self.optimizer.forget_user(&record.user_id);
            }
        }
        Ok(())
    }

    // Cost

    pub fn optimize(&self, request: &OptimizationRequest) -> OptimizationDecision {
        self.optimizer.optimize(request)
    }

    pub fn optimization_audit(&self, user_id: Option<&str>) -> Vec<OptimizationAudit> {
        self.optimizer.audit_trail(user_id)
    }

    // Maintenance

    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        self.reconciler.run_once().await
    }

    /// Start periodic reconciliation at the configured interval
    pub fn spawn_reconciler(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        self.reconciler
            .clone()
            .spawn_periodic(self.config.reconcile_interval, shutdown)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Build the backend named by `config.backend`
pub async fn connect_backend(config: &CoreConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn KvBackend>> {
    match config.backend {
        BackendKind::Memory => Ok(Arc::new(InMemoryBackend::with_clock(clock))),
        BackendKind::Null => Ok(Arc::new(NullBackend::new())),
        BackendKind::Redis => connect_redis(config).await,
    }
}

#[cfg(feature = "redis-backend")]
async fn connect_redis(config: &CoreConfig) -> Result<Arc<dyn KvBackend>> {
    let url = config
        .redis_url
        .as_deref()
        .ok_or_else(|| CoreError::ConfigError("redis backend requires a URL".to_string()))?;
    Ok(Arc::new(crate::backend::RedisBackend::connect(url).await?))
}

#[cfg(not(feature = "redis-backend"))]
async fn connect_redis(_config: &CoreConfig) -> Result<Arc<dyn KvBackend>> {
    tracing::warn!("Redis backend requested but this build lacks the redis-backend feature");
    Err(CoreError::ConfigError(
        "built without the redis-backend feature".to_string(),
    ))
}
