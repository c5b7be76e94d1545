//! Integration tests for consent, memory and retention
//!
//! Covers:
//! - Default-deny consent and the test-environment override
//! - Memory round trip and expiry at the retention window
//! - Revocation cascade, erasure and export
//! - Expiry reconciliation
//! - Degraded backends on the fail-loud path
//! - Cost optimizer decisions and their audit trail

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use splitbot_cache::cost::{OptimizationRequest, UserTier};
use splitbot_cache::retention::keys;
use splitbot_cache::retention::{MemoryRecord, RetentionPolicy};
use splitbot_cache::{
    AssistantCore, BackendKind, Backends, Clock, ConsentPurpose, ConsentRecord, CoreConfig,
    CoreError, Environment, InMemoryBackend, KeyTtl, KvBackend, ManualClock, MemoryCategory, NullBackend,
};
use std::collections::BTreeMap;
use std::sync::Arc;

fn production_core() -> (Arc<ManualClock>, Arc<InMemoryBackend>, AssistantCore) {
    core_with(CoreConfig::production())
}

fn core_with(config: CoreConfig) -> (Arc<ManualClock>, Arc<InMemoryBackend>, AssistantCore) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 3, 18, 45, 0).unwrap(),
    ));
    let backend = Arc::new(InMemoryBackend::with_clock(clock.clone()));
    let core = AssistantCore::new(config, Backends::shared(backend.clone()), clock.clone()).unwrap();
    (clock, backend, core)
}

async fn grant(core: &AssistantCore, clock: &ManualClock, user: &str, purpose: ConsentPurpose) {
    let record = ConsentRecord::granted(user, purpose, clock.now(), &RetentionPolicy::standard());
    core.set_consent(&record).await.unwrap();
}

#[tokio::test]
async fn test_default_deny_blocks_memory_writes() {
    let (_, backend, core) = production_core();

    let consent = core
        .get_consent("new-user", ConsentPurpose::MemoryRetention)
        .await
        .unwrap();
    assert!(!consent.granted);

    let result = core
        .write_memory("new-user", MemoryCategory::Conversation, json!({"msg": "oi"}))
        .await;
    assert!(matches!(result, Err(CoreError::ConsentDenied { .. })));
    assert!(backend.is_empty().await);
    assert_eq!(core.metrics().memory_denied, 1);
}

#[tokio::test]
async fn test_test_environment_grants_by_default() {
    let (_, _, core) = core_with(CoreConfig::testing());
    assert_eq!(core.config().environment, Environment::Test);
    let id = core
        .write_memory("u1", MemoryCategory::Conversation, json!("oi"))
        .await
        .unwrap();
    assert!(core.read_memory("u1", &id).await.is_ok());
}

#[tokio::test]
async fn test_conversation_round_trip_and_ninety_day_window() {
    let (clock, _, core) = production_core();
    grant(&core, &clock, "u1", ConsentPurpose::MemoryRetention).await;
    let t = clock.now();

    let payload = json!({"group": "viagem", "members": ["ana", "bia", "caio"]});
    let id = core
        .write_memory("u1", MemoryCategory::Conversation, payload.clone())
        .await
        .unwrap();

    let record = core.read_memory("u1", &id).await.unwrap();
    assert_eq!(record.payload, payload);
    assert_eq!(record.created_at, t);
    assert_eq!(record.expires_at, t + Duration::days(90));
    assert_eq!(core.metrics().memory_writes, 1);

    clock.advance(Duration::days(90) - Duration::seconds(1));
    assert!(core.read_memory("u1", &id).await.is_ok());

    clock.advance(Duration::days(2));
    assert!(matches!(
        core.read_memory("u1", &id).await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_revocation_cascades_to_covered_data() {
    let (clock, _, core) = production_core();
    grant(&core, &clock, "u1", ConsentPurpose::MemoryRetention).await;
    grant(&core, &clock, "u1", ConsentPurpose::Analytics).await;

    let conversation = core
        .write_memory("u1", MemoryCategory::Conversation, json!("a"))
        .await
        .unwrap();
    clock.advance(Duration::seconds(1));
    let pattern = core
        .write_memory("u1", MemoryCategory::GroupPattern, json!({"splits": "equal"}))
        .await
        .unwrap();

    let revoke = ConsentRecord::revoked("u1", ConsentPurpose::MemoryRetention, clock.now());
    core.set_consent(&revoke).await.unwrap();

    assert!(matches!(
        core.read_memory("u1", &conversation).await,
        Err(CoreError::NotFound(_))
    ));
    assert!(core.read_memory("u1", &pattern).await.is_ok());
    assert!(matches!(
        core.write_memory("u1", MemoryCategory::CulturalContext, json!("pix")).await,
        Err(CoreError::ConsentDenied { .. })
    ));
}

#[tokio::test]
async fn test_erase_then_export_is_empty() {
    let (clock, backend, core) = production_core();
    for purpose in ConsentPurpose::ALL {
        grant(&core, &clock, "u1", purpose).await;
    }
    grant(&core, &clock, "u2", ConsentPurpose::MemoryRetention).await;

    core.write_memory("u1", MemoryCategory::Conversation, json!("a")).await.unwrap();
    core.write_memory("u1", MemoryCategory::GroupPattern, json!("b")).await.unwrap();
    core.set_preferences("u1", BTreeMap::from([("currency".to_string(), json!("BRL"))]))
        .await
        .unwrap();
    core.write_memory("u2", MemoryCategory::Conversation, json!("c")).await.unwrap();

    let bundle = core.export_user("u1").await.unwrap();
    assert_eq!(bundle.records.len(), 2);
    assert_eq!(bundle.consents.len(), 3);
    assert!(bundle.preferences.is_some());
    // Export is a portable document
    let exported = serde_json::to_value(&bundle).unwrap();
    assert_eq!(exported["user_id"], "u1");

    let report = core.erase_user("u1").await.unwrap();
    assert_eq!(report.records_deleted, 2);
    assert_eq!(report.consents_deleted, 3);
    assert!(report.preferences_deleted);

    assert!(core.export_user("u1").await.unwrap().is_empty());
    for purpose in ConsentPurpose::ALL {
        let consent = core.get_consent("u1", purpose).await.unwrap();
        assert!(!consent.granted, "{} still granted after erasure", purpose);
    }
    assert!(backend
        .scan_prefix(&keys::memory_prefix("u1"))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(core.export_user("u2").await.unwrap().records.len(), 1);
}

#[tokio::test]
async fn test_reconciler_repairs_and_is_idempotent() {
    let (clock, backend, core) = production_core();
    let now = clock.now();

    let record = |id: &str, age_days: i64, category: MemoryCategory| MemoryRecord {
        id: id.to_string(),
        user_id: "u1".to_string(),
        category,
        payload: json!(null),
        created_at: now - Duration::days(age_days),
        expires_at: now,
        consent_ref: String::new(),
    };
    for (id, age, category) in [
        ("recent", 5, MemoryCategory::Conversation),
        ("old", 100, MemoryCategory::Conversation),
        ("pattern", 100, MemoryCategory::GroupPattern),
    ] {
        backend
            .set(
                &keys::memory_key("u1", id),
                &serde_json::to_string(&record(id, age, category)).unwrap(),
                None,
            )
            .await
            .unwrap();
    }

    let first = core.reconcile().await.unwrap();
    assert_eq!(first.scanned, 3);
    assert_eq!(first.repaired, 2);
    assert_eq!(first.purged, 1);
    assert_eq!(core.metrics().reconcile_repaired, 2);

    assert_eq!(
        backend.ttl_remaining(&keys::memory_key("u1", "pattern")).await.unwrap(),
        KeyTtl::Expires(std::time::Duration::from_secs(80 * 86_400))
    );
    assert!(!backend.exists(&keys::memory_key("u1", "old")).await.unwrap());

    let second = core.reconcile().await.unwrap();
    assert_eq!(second.repaired, 0);
    assert_eq!(second.purged, 0);
    assert_eq!(second.skipped, 2);
}

#[tokio::test]
async fn test_memory_fails_loud_on_null_backend() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let core = AssistantCore::new(
        CoreConfig::builder()
            .environment(Environment::Test)
            .backend(BackendKind::Null)
            .build(),
        Backends::shared(Arc::new(NullBackend::new())),
        clock,
    )
    .unwrap();

    let err = core
        .write_memory("u1", MemoryCategory::Conversation, json!("a"))
        .await
        .unwrap_err();
    assert!(err.is_backend());
}

#[tokio::test]
async fn test_memory_fails_loud_on_outage() {
    let (clock, backend, core) = production_core();
    grant(&core, &clock, "u1", ConsentPurpose::MemoryRetention).await;
    let id = core
        .write_memory("u1", MemoryCategory::Conversation, json!("a"))
        .await
        .unwrap();

    backend.set_available(false);
    assert!(core.read_memory("u1", &id).await.unwrap_err().is_backend());
    assert!(core.export_user("u1").await.unwrap_err().is_backend());
}

#[tokio::test]
async fn test_concurrent_consent_writes_resolve_to_one_record() {
    let (clock, _, core) = production_core();
    let grant = ConsentRecord::granted(
        "u1",
        ConsentPurpose::Analytics,
        clock.now(),
        &RetentionPolicy::standard(),
    );
    let revoke = ConsentRecord::revoked("u1", ConsentPurpose::Analytics, clock.now());

    let (a, b) = tokio::join!(core.set_consent(&grant), core.set_consent(&revoke));
    a.unwrap();
    b.unwrap();

    let current = core.get_consent("u1", ConsentPurpose::Analytics).await.unwrap();
    assert!(current == grant || current == revoke);
}

#[tokio::test]
async fn test_optimizer_scenarios() {
    let (_, _, core) = production_core();

    let scenario = OptimizationRequest {
        user_id: "u1".to_string(),
        text: "Dividir conta com 10% de taxa de serviço e 3 pessoas".to_string(),
        daily_usage: 1.0,
        daily_budget: 10.0,
        tier: UserTier::Premium,
    };
    let decision = core.optimize(&scenario);
    assert!(decision.compress_context);
    assert!(decision.enable_caching);
    assert!(!decision.use_fallback);

    let exhausted = OptimizationRequest {
        daily_usage: 9.5,
        ..scenario.clone()
    };
    assert!(core.optimize(&exhausted).use_fallback);

    assert_eq!(core.optimization_audit(Some("u1")).len(), 2);
    core.erase_user("u1").await.unwrap();
    assert!(core.optimization_audit(Some("u1")).is_empty());
}

#[tokio::test]
async fn test_invalid_input_rejected_before_io() {
    let (clock, backend, core) = production_core();
    backend.set_available(false);

    assert!(matches!(
        core.write_memory("a:b", MemoryCategory::Conversation, json!(1)).await,
        Err(CoreError::ValidationError(_))
    ));
    assert!(matches!(
        "memories".parse::<MemoryCategory>(),
        Err(CoreError::ValidationError(_))
    ));

    let mut record = ConsentRecord::granted(
        "u1",
        ConsentPurpose::MemoryRetention,
        clock.now(),
        &RetentionPolicy::standard(),
    );
    record.retention_days = 10_000;
    assert!(matches!(
        core.set_consent(&record).await,
        Err(CoreError::ValidationError(_))
    ));
}

#[tokio::test]
async fn test_bare_records_are_bounded_and_exportable() {
    let (clock, backend, core) = production_core();
    grant(&core, &clock, "u1", ConsentPurpose::MemoryRetention).await;
    let now = clock.now();

    for (id, age) in [("old", 200), ("recent", 20)] {
        let bare = json!({
            "id": id,
            "user_id": "u1",
            "category": "conversation",
            "payload": {"total": 120},
            "created_at": now - Duration::days(age),
        });
        backend
            .set(&keys::memory_key("u1", id), &bare.to_string(), None)
            .await
            .unwrap();
    }

    let report = core.reconcile().await.unwrap();
    assert_eq!(report.purged, 1);
    assert_eq!(report.repaired, 1);
    assert!(!backend.exists(&keys::memory_key("u1", "old")).await.unwrap());
    assert_eq!(
        backend.ttl_remaining(&keys::memory_key("u1", "recent")).await.unwrap(),
        KeyTtl::Expires(std::time::Duration::from_secs(70 * 86_400))
    );

    let bundle = core.export_user("u1").await.unwrap();
    assert_eq!(bundle.records.len(), 1);
    assert_eq!(bundle.records[0].expires_at, now + Duration::days(70));
}
