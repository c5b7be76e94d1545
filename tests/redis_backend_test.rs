//! Redis backend contract tests
//!
//! Need a running Redis. Set `REDIS_URL` or start one locally:
//! `docker run -p 6379:6379 redis:7`

#![cfg(feature = "redis-backend")]

use splitbot_cache::backend::RedisBackend;
use splitbot_cache::{KeyTtl, KvBackend};
use std::time::Duration;
use uuid::Uuid;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Unique prefix so concurrent runs don't see each other's keys
fn scratch_prefix() -> String {
    format!("splitbot-test:{}:", Uuid::new_v4())
}

#[tokio::test]
#[ignore] // Run with: cargo test --features redis-backend -- --ignored
async fn test_redis_set_get_delete() {
    let backend = RedisBackend::connect(&redis_url()).await.unwrap();
    let prefix = scratch_prefix();
    let key = format!("{}a", prefix);

    assert_eq!(backend.get(&key).await.unwrap(), None);
    backend.set(&key, "valor", None).await.unwrap();
    assert_eq!(backend.get(&key).await.unwrap().as_deref(), Some("valor"));
    assert_eq!(backend.ttl_remaining(&key).await.unwrap(), KeyTtl::Persistent);

    assert!(backend.delete(&key).await.unwrap());
    assert!(!backend.delete(&key).await.unwrap());
    assert_eq!(backend.ttl_remaining(&key).await.unwrap(), KeyTtl::Missing);
}

#[tokio::test]
#[ignore] // Run with: cargo test --features redis-backend -- --ignored
async fn test_redis_native_expiration() {
    let backend = RedisBackend::connect(&redis_url()).await.unwrap();
    let key = format!("{}ttl", scratch_prefix());

    backend
        .set(&key, "x", Some(Duration::from_secs(60)))
        .await
        .unwrap();
    match backend.ttl_remaining(&key).await.unwrap() {
        KeyTtl::Expires(left) => assert!(left <= Duration::from_secs(60)),
        other => panic!("expected expiring key, got {:?}", other),
    }

    backend.set(&key, "y", None).await.unwrap();
    assert!(backend.expire(&key, Duration::from_secs(1)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(backend.get(&key).await.unwrap(), None);
    assert!(!backend.expire(&key, Duration::from_secs(1)).await.unwrap());
}

#[tokio::test]
#[ignore] // Run with: cargo test --features redis-backend -- --ignored
async fn test_redis_scan_prefix_is_literal() {
    let backend = RedisBackend::connect(&redis_url()).await.unwrap();
    let prefix = scratch_prefix();

    for suffix in ["1", "2", "3"] {
        backend
            .set(&format!("{}u1:{}", prefix, suffix), "v", Some(Duration::from_secs(60)))
            .await
            .unwrap();
    }
    backend
        .set(&format!("{}u10:1", prefix), "v", Some(Duration::from_secs(60)))
        .await
        .unwrap();

    let keys = backend.scan_prefix(&format!("{}u1:", prefix)).await.unwrap();
    assert_eq!(keys.len(), 3);
    assert!(keys.iter().all(|k| k.starts_with(&format!("{}u1:", prefix))));

    for key in backend.scan_prefix(&prefix).await.unwrap() {
        backend.delete(&key).await.unwrap();
    }
    assert!(backend.scan_prefix(&prefix).await.unwrap().is_empty());
}
