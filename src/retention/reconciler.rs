//! Expiry reconciliation
//!
//! A memory or preference key should always carry a native TTL. If one is
//! found without (a crash between writes, a manual restore), its deadline is
//! recomputed from the stored creation time and the retention window: a
//! deadline still in the future is re-attached, one already past means the
//! key is deleted. Running the sweep twice changes nothing the second time.

use crate::backend::{KeyTtl, KvBackend};
use crate::clock::Clock;
use crate::error::Result;
use crate::metrics::MetricsRecorder;
use crate::retention::keys::{MEMORY_NAMESPACE, PREFERENCES_NAMESPACE};
use crate::retention::memory::StoredRecord;
use crate::retention::policy::{DataCategory, RetentionPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Counts from one reconciliation sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Keys examined
    pub scanned: usize,
    /// Keys that had a TTL re-attached
    pub repaired: usize,
    /// Keys deleted because their window had already closed
    pub purged: usize,
    /// Keys left alone (TTL present, vanished, or unreadable)
    pub skipped: usize,
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned: {}, repaired: {}, purged: {}, skipped: {}",
            self.scanned, self.repaired, self.purged, self.skipped
        )
    }
}

#[derive(Deserialize)]
struct PreferencesTimestamp {
    updated_at: DateTime<Utc>,
}

/// Restores missing expirations on user data
pub struct ExpiryReconciler {
    backend: Arc<dyn KvBackend>,
    policy: RetentionPolicy,
    clock: Arc<dyn Clock>,
    metrics: MetricsRecorder,
}

impl ExpiryReconciler {
    pub fn new(
        backend: Arc<dyn KvBackend>,
        policy: RetentionPolicy,
        clock: Arc<dyn Clock>,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            backend,
            policy,
            clock,
            metrics,
        }
    }

    /// One full sweep over memory and preference keys
    pub async fn run_once(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for namespace in [MEMORY_NAMESPACE, PREFERENCES_NAMESPACE] {
            for key in self.backend.scan_prefix(namespace).await? {
                report.scanned += 1;
                self.reconcile_key(&key, &mut report).await?;
            }
        }

        self.metrics.record_reconcile_repaired(report.repaired as u64);
        info!("Expiry reconciliation finished ({})", report);
        Ok(report)
    }

    async fn reconcile_key(&self, key: &str, report: &mut ReconcileReport) -> Result<()> {
        if !matches!(self.backend.ttl_remaining(key).await?, KeyTtl::Persistent) {
            report.skipped += 1;
            return Ok(());
        }

        let Some(raw) = self.backend.get(key).await? else {
            report.skipped += 1;
            return Ok(());
        };

        let Some(deadline) = self.deadline_for(key, &raw) else {
            warn!("Cannot determine retention for {}; leaving it untouched", key);
            report.skipped += 1;
            return Ok(());
        };

        match (deadline - self.clock.now()).to_std() {
            Ok(remaining) if remaining > Duration::ZERO => {
                if self.backend.expire(key, remaining).await? {
                    debug!("Re-attached TTL of {:?} to {}", remaining, key);
                    report.repaired += 1;
                } else {
                    report.skipped += 1;
                }
            }
            _ => {
                if self.backend.delete(key).await? {
                    debug!("Deleted {} past its retention window", key);
                    report.purged += 1;
                } else {
                    report.skipped += 1;
                }
            }
        }
        Ok(())
    }

    fn deadline_for(&self, key: &str, raw: &str) -> Option<DateTime<Utc>> {
        if key.starts_with(MEMORY_NAMESPACE) {
            let record = StoredRecord::decode(raw).ok()?;
            Some(record.retention_deadline(&self.policy))
        } else {
            let preferences: PreferencesTimestamp = serde_json::from_str(raw).ok()?;
            Some(preferences.updated_at + self.policy.max_age(DataCategory::Preference))
        }
    }

    /// Run `run_once` every `interval` until `shutdown` flips to `true` or its sender drops
    pub fn spawn_periodic(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        info!("Starting expiry reconciler (interval: {:?})", interval);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = self.run_once().await {
                            warn!("Expiry reconciliation failed: {}", e);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Expiry reconciler stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::clock::ManualClock;
    use crate::retention::keys;
    use crate::retention::memory::{MemoryRecord, Preferences};
    use crate::retention::policy::MemoryCategory;
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn setup() -> (Arc<ManualClock>, Arc<InMemoryBackend>, ExpiryReconciler) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
        ));
        let backend = Arc::new(InMemoryBackend::with_clock(clock.clone()));
        let reconciler = ExpiryReconciler::new(
            backend.clone(),
            RetentionPolicy::standard(),
            clock.clone(),
            MetricsRecorder::in_memory(),
        );
        (clock, backend, reconciler)
    }

    fn record(id: &str, created_at: DateTime<Utc>) -> String {
        serde_json::to_string(&MemoryRecord {
            id: id.to_string(),
            user_id: "u1".to_string(),
            category: MemoryCategory::Conversation,
            payload: json!("x"),
            created_at,
            expires_at: created_at + chrono::Duration::days(90),
            consent_ref: String::new(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_repairs_and_purges() {
        let (clock, backend, reconciler) = setup();
        let now = clock.now();

        let fresh = keys::memory_key("u1", "fresh");
        let stale = keys::memory_key("u1", "stale");
        let healthy = keys::memory_key("u1", "healthy");
        backend.set(&fresh, &record("fresh", now - chrono::Duration::days(10)), None).await.unwrap();
        backend.set(&stale, &record("stale", now - chrono::Duration::days(120)), None).await.unwrap();
        backend
            .set(&healthy, &record("healthy", now), Some(Duration::from_secs(3600)))
            .await
            .unwrap();

        let report = reconciler.run_once().await.unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.repaired, 1);
        assert_eq!(report.purged, 1);
        assert_eq!(report.skipped, 1);

        assert!(!backend.exists(&stale).await.unwrap());
        match backend.ttl_remaining(&fresh).await.unwrap() {
            KeyTtl::Expires(d) => assert_eq!(d, Duration::from_secs(80 * 86_400)),
            other => panic!("expected TTL, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_idempotent() {
        let (clock, backend, reconciler) = setup();
        let now = clock.now();
        backend
            .set(&keys::memory_key("u1", "a"), &record("a", now - chrono::Duration::days(1)), None)
            .await
            .unwrap();
        backend
            .set(&keys::memory_key("u1", "b"), &record("b", now - chrono::Duration::days(200)), None)
            .await
            .unwrap();

        let first = reconciler.run_once().await.unwrap();
        assert_eq!((first.repaired, first.purged), (1, 1));

        let second = reconciler.run_once().await.unwrap();
        assert_eq!(second.repaired, 0);
        assert_eq!(second.purged, 0);
        assert_eq!(second.scanned, 1);
    }

    #[tokio::test]
    async fn test_preferences_and_unreadable_keys() {
        let (clock, backend, reconciler) = setup();
        let now = clock.now();
        let preferences = Preferences {
            user_id: "u1".to_string(),
            values: BTreeMap::new(),
            updated_at: now - chrono::Duration::days(400),
            expires_at: now - chrono::Duration::days(35),
        };
        backend
            .set(&keys::preferences_key("u1"), &serde_json::to_string(&preferences).unwrap(), None)
            .await
            .unwrap();
        backend.set(&keys::memory_key("u1", "junk"), "not json", None).await.unwrap();

        let report = reconciler.run_once().await.unwrap();
        assert_eq!(report.purged, 1);
        assert_eq!(report.skipped, 1);
        assert!(backend.exists(&keys::memory_key("u1", "junk")).await.unwrap());
    }

    #[tokio::test]
    async fn test_periodic_stops_on_shutdown() {
        let (_, _, reconciler) = setup();
        let (tx, rx) = watch::channel(false);
        let handle = Arc::new(reconciler).spawn_periodic(Duration::from_millis(5), rx);
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reconciler did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_repairs_records_missing_newer_fields() {
        let (clock, backend, reconciler) = setup();
        let now = clock.now();
        let bare = |created_at: DateTime<Utc>| {
            json!({
                "id": "legacy",
                "user_id": "u1",
                "category": "conversation",
                "payload": {"note": "churrasco"},
                "created_at": created_at,
            })
            .to_string()
        };
        let old = keys::memory_key("u1", "old");
        let young = keys::memory_key("u1", "young");
        backend.set(&old, &bare(now - chrono::Duration::days(200)), None).await.unwrap();
        backend.set(&young, &bare(now - chrono::Duration::days(30)), None).await.unwrap();

        let first = reconciler.run_once().await.unwrap();
        assert_eq!((first.scanned, first.repaired, first.purged, first.skipped), (2, 1, 1, 0));
        assert!(!backend.exists(&old).await.unwrap());
        assert_eq!(
            backend.ttl_remaining(&young).await.unwrap(),
            KeyTtl::Expires(Duration::from_secs(60 * 86_400))
        );

        let second = reconciler.run_once().await.unwrap();
        assert_eq!((second.repaired, second.purged), (0, 0));
    }
}
