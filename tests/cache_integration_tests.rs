//! Integration tests for the response cache
//!
//! These tests drive the cache through `AssistantCore` with an in-memory
//! backend and a manual clock:
//! - Key derivation
//! - Adaptive TTL rules in the region's local time
//! - Expiration
//! - Fail-open behavior
//! - Usage metrics and warm-up

use chrono::{TimeZone, Utc};
use serde_json::json;
use splitbot_cache::cache::TtlRule;
use splitbot_cache::{
    AssistantCore, Backends, CachedResponse, Channel, CoreConfig, InMemoryBackend, ManualClock,
    RequestDescriptor,
};
use std::sync::Arc;

/// Wednesday 2024-03-13 at `hour`:00 UTC (Sao Paulo is UTC-3)
fn wednesday_utc(hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 13, hour, 0, 0).unwrap()
}

fn core_at(start: chrono::DateTime<Utc>) -> (Arc<ManualClock>, Arc<InMemoryBackend>, AssistantCore) {
    let clock = Arc::new(ManualClock::new(start));
    let backend = Arc::new(InMemoryBackend::with_clock(clock.clone()));
    let core = AssistantCore::new(
        CoreConfig::testing(),
        Backends::shared(backend.clone()),
        clock.clone(),
    )
    .unwrap();
    (clock, backend, core)
}

fn answer(tokens: u32, model: &str) -> CachedResponse {
    CachedResponse::new("Cada um paga R$ 40,00", tokens, model)
}

#[tokio::test]
async fn test_basic_cache_operations() {
    let (_, _, core) = core_at(wednesday_utc(6));
    let request = RequestDescriptor::new("BR", "gpt-4o-mini", "Divide R$ 120 entre 3 pessoas");

    assert!(core.get_cached(&request).await.is_none());
    core.put_cached(&request, answer(20, "gpt-4o-mini")).await;
    assert_eq!(core.get_cached(&request).await, Some(answer(20, "gpt-4o-mini")));

    let metrics = core.metrics();
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 1);
    assert_eq!(metrics.cache_sets, 1);
    assert_eq!(metrics.hit_rate(), 50.0);
}

#[tokio::test]
async fn test_key_is_independent_of_context_key_order() {
    let (_, _, core) = core_at(wednesday_utc(6));
    let a = RequestDescriptor::new("BR", "gpt-4o-mini", "racha")
        .with_context(serde_json::from_str(r#"{"people":["ana","bia"],"tip":{"pct":10,"on":"food"}}"#).unwrap());
    let b = RequestDescriptor::new("BR", "gpt-4o-mini", "racha")
        .with_context(serde_json::from_str(r#"{"tip":{"on":"food","pct":10},"people":["ana","bia"]}"#).unwrap());

    assert_eq!(core.cache_key(&a), core.cache_key(&b));
    assert!(core.cache_key(&a).starts_with("cache:BR:gpt-4o-mini:"));

    core.put_cached(&a, answer(10, "gpt-4o-mini")).await;
    assert!(core.get_cached(&b).await.is_some());
}

#[tokio::test]
async fn test_ttl_rules_in_priority_order() {
    // 15:00 UTC is 12:00 in Sao Paulo: lunch peak
    let (_, _, core) = core_at(wednesday_utc(15));
    assert!(core.is_peak("BR"));

    let premium = core
        .put_cached(&RequestDescriptor::new("BR", "gpt-4o", "a"), answer(100, "gpt-4o"))
        .await;
    assert_eq!(premium.ttl_seconds, 14_400);
    assert_eq!(premium.rule, TtlRule::PremiumModel);

    let large = core
        .put_cached(&RequestDescriptor::new("BR", "gpt-4o-mini", "b"), answer(2_500, "gpt-4o-mini"))
        .await;
    assert_eq!(large.ttl_seconds, 7_200);
    assert_eq!(large.rule, TtlRule::LargeResponse);

    let peak = core
        .put_cached(&RequestDescriptor::new("BR", "gpt-4o-mini", "c"), answer(100, "gpt-4o-mini"))
        .await;
    assert_eq!(peak.ttl_seconds, 1_800);
    assert_eq!(peak.rule, TtlRule::Peak);
}

#[tokio::test]
async fn test_off_peak_uses_base_ttl() {
    // 06:00 UTC is 03:00 in Sao Paulo
    let (_, _, core) = core_at(wednesday_utc(6));
    assert!(!core.is_peak("BR"));
    let decision = core
        .put_cached(&RequestDescriptor::new("BR", "gpt-4o-mini", "a"), answer(100, "gpt-4o-mini"))
        .await;
    assert_eq!(decision.ttl_seconds, 3_600);
    assert_eq!(decision.rule, TtlRule::Base);
}

#[tokio::test]
async fn test_peak_is_evaluated_in_region_time() {
    // 13:00 UTC: 10:00 in Sao Paulo (no window on a weekday), 13:00 in Lisbon (lunch)
    let (_, _, core) = core_at(wednesday_utc(13));
    assert!(!core.is_peak("BR"));
    assert!(core.is_peak("PT"));

    // Saturday 10:00 in Sao Paulo falls in the weekend window
    let (_, _, core) = core_at(Utc.with_ymd_and_hms(2024, 3, 16, 13, 0, 0).unwrap());
    assert!(core.is_peak("BR"));
}

#[tokio::test]
async fn test_ttl_expiration() {
    let (clock, _, core) = core_at(wednesday_utc(6));
    let request = RequestDescriptor::new("BR", "gpt-4o-mini", "expira");
    let decision = core.put_cached(&request, answer(10, "gpt-4o-mini")).await;

    clock.advance(chrono::Duration::seconds(decision.ttl_seconds as i64 - 1));
    assert!(core.get_cached(&request).await.is_some());

    clock.advance(chrono::Duration::seconds(1));
    assert!(core.get_cached(&request).await.is_none());
}

#[tokio::test]
async fn test_fail_open_when_backend_down() {
    let (_, backend, core) = core_at(wednesday_utc(6));
    let request = RequestDescriptor::new("BR", "gpt-4o-mini", "oi");
    core.put_cached(&request, answer(5, "gpt-4o-mini")).await;

    backend.set_available(false);
    assert!(core.get_cached(&request).await.is_none());
    core.put_cached(&RequestDescriptor::new("BR", "gpt-4o-mini", "tchau"), answer(5, "gpt-4o-mini"))
        .await;

    backend.set_available(true);
    assert!(core.get_cached(&request).await.is_some());
    assert!(core
        .get_cached(&RequestDescriptor::new("BR", "gpt-4o-mini", "tchau"))
        .await
        .is_none());
}

#[tokio::test]
async fn test_usage_metrics_by_window_and_channel() {
    let (_, _, core) = core_at(wednesday_utc(15));
    let web = RequestDescriptor::new("BR", "gpt-4o-mini", "oi");
    let mobile = web.clone().with_channel(Channel::Mobile);
    core.get_cached(&web).await;
    core.get_cached(&mobile).await;

    let (_, _, off_peak_core) = core_at(wednesday_utc(6));
    off_peak_core.get_cached(&web).await;

    let metrics = core.metrics();
    assert_eq!(metrics.usage_peak, 2);
    assert_eq!(metrics.usage_mobile, 1);
    assert_eq!(off_peak_core.metrics().usage_off_peak, 1);
}

#[tokio::test]
async fn test_warm_cache_runs_on_queue() {
    let (_, _, core) = core_at(wednesday_utc(6));
    let items = vec![
        (
            RequestDescriptor::new("BR", "gpt-4o-mini", "quanto é 10% de 200?"),
            answer(8, "gpt-4o-mini"),
        ),
        (
            RequestDescriptor::new("BR", "gpt-4o", "divide a conta do churrasco")
                .with_context(json!({"people": 6})),
            answer(30, "gpt-4o"),
        ),
    ];
    let ids = core.warm_cache(items.clone());
    assert_eq!(ids.len(), 2);

    let outcomes = core.queue().drain().await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.is_success()));

    for (request, response) in items {
        assert_eq!(core.get_cached(&request).await, Some(response));
    }
}

#[tokio::test]
async fn test_concurrent_access() {
    let (_, _, core) = core_at(wednesday_utc(6));
    let core = Arc::new(core);

    let writers = (0..20).map(|i| {
        let core = core.clone();
        async move {
            let request = RequestDescriptor::new("BR", "gpt-4o-mini", format!("pedido {}", i));
            core.put_cached(&request, answer(i, "gpt-4o-mini")).await;
        }
    });
    futures::future::join_all(writers).await;

    let readers = (0..20).map(|i| {
        let core = core.clone();
        async move {
            let request = RequestDescriptor::new("BR", "gpt-4o-mini", format!("pedido {}", i));
            core.get_cached(&request).await
        }
    });
    let results = futures::future::join_all(readers).await;
    assert!(results.iter().all(|r| r.is_some()));
    assert_eq!(core.metrics().cache_sets, 20);
}
