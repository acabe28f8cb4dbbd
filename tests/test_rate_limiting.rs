//! Tests for the fixed-window rate limiter contract.

use async_trait::async_trait;
use genie_gateway::core::rate_limiter::{
    decision_headers, derive_client_id, Endpoint, InfraError, RateLimitDecision, RateLimitRecord,
    RateLimiter, RateLimitStore,
};
use axum::http::{HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-memory counter store mirroring the upsert contract of the real table.
#[derive(Default)]
struct MemoryStore {
    records: Mutex<HashMap<(String, String), RateLimitRecord>>,
    overages: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn fetch(
        &self,
        client_id: &str,
        endpoint: &str,
    ) -> Result<Option<RateLimitRecord>, InfraError> {
        let records = self.records.lock().await;
        Ok(records
            .get(&(client_id.to_string(), endpoint.to_string()))
            .cloned())
    }

    async fn put(&self, record: &RateLimitRecord) -> Result<(), InfraError> {
        self.records.lock().await.insert(
            (record.client_id.clone(), record.endpoint.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn record_overage(
        &self,
        client_id: &str,
        endpoint: &str,
        _request_count: i32,
    ) -> Result<(), InfraError> {
        self.overages
            .lock()
            .await
            .push((client_id.to_string(), endpoint.to_string()));
        Ok(())
    }
}

/// Store whose every operation fails, as when the database is down.
struct UnreachableStore;

#[async_trait]
impl RateLimitStore for UnreachableStore {
    async fn fetch(&self, _: &str, _: &str) -> Result<Option<RateLimitRecord>, InfraError> {
        Err(InfraError::Unavailable("connection refused".to_string()))
    }

    async fn put(&self, _: &RateLimitRecord) -> Result<(), InfraError> {
        Err(InfraError::Unavailable("connection refused".to_string()))
    }

    async fn record_overage(&self, _: &str, _: &str, _: i32) -> Result<(), InfraError> {
        Err(InfraError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_window_lifecycle() {
    let limiter = RateLimiter::new(Arc::new(MemoryStore::default()));
    let policy = Endpoint::AiChat.policy();
    let window_open = 1_000_000;

    // Calls 1..=max within the window are allowed with strictly
    // decreasing remaining, max-1 down to 0.
    for i in 0..policy.max_requests {
        let decision = limiter
            .check_at("9.9.9.9", Endpoint::AiChat, window_open + i as i64)
            .await
            .unwrap();
        assert!(decision.allowed, "call {} should be allowed", i + 1);
        assert_eq!(decision.remaining, policy.max_requests - 1 - i);
    }

    // The next call within the same window is rejected.
    let rejected = limiter
        .check_at("9.9.9.9", Endpoint::AiChat, window_open + 5_000)
        .await
        .unwrap();
    assert!(!rejected.allowed);
    assert_eq!(rejected.remaining, 0);
    assert_eq!(rejected.reset_at_ms, window_open + policy.window_millis);

    // A call at or past the window end starts a fresh window.
    let fresh = limiter
        .check_at("9.9.9.9", Endpoint::AiChat, window_open + policy.window_millis)
        .await
        .unwrap();
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, policy.max_requests - 1);
}

#[tokio::test]
async fn test_rejection_records_security_event() {
    let store = Arc::new(MemoryStore::default());
    let limiter = RateLimiter::new(store.clone());
    let policy = Endpoint::AiChat.policy();

    for _ in 0..policy.max_requests {
        limiter.check_at("9.9.9.9", Endpoint::AiChat, 0).await.unwrap();
    }
    assert!(store.overages.lock().await.is_empty());

    limiter.check_at("9.9.9.9", Endpoint::AiChat, 1).await.unwrap();
    let overages = store.overages.lock().await;
    assert_eq!(overages.len(), 1);
    assert_eq!(overages[0].0, "9.9.9.9");
    assert_eq!(overages[0].1, "ai-chat");
}

#[tokio::test]
async fn test_fail_open_when_store_unreachable() {
    let limiter = RateLimiter::new(Arc::new(UnreachableStore));

    // Regardless of prior call history the limiter admits everything.
    for _ in 0..200 {
        let decision = limiter.check("9.9.9.9", Endpoint::AiChat).await;
        assert!(decision.allowed);
    }
}

#[tokio::test]
async fn test_distinct_clients_do_not_share_windows() {
    let limiter = RateLimiter::new(Arc::new(MemoryStore::default()));
    let policy = Endpoint::AiChat.policy();

    for _ in 0..policy.max_requests {
        limiter.check_at("1.1.1.1", Endpoint::AiChat, 0).await.unwrap();
    }
    assert!(!limiter.check_at("1.1.1.1", Endpoint::AiChat, 1).await.unwrap().allowed);

    let other = limiter.check_at("2.2.2.2", Endpoint::AiChat, 1).await.unwrap();
    assert!(other.allowed);
    assert_eq!(other.remaining, policy.max_requests - 1);
}

#[test]
fn test_client_identity_derivation_order() {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-forwarded-for",
        HeaderValue::from_static("203.0.113.5, 70.41.3.18, 150.172.238.178"),
    );
    headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.7"));

    // Forwarded-for wins, first entry only
    assert_eq!(derive_client_id(&headers), "203.0.113.5");

    headers.remove("x-forwarded-for");
    assert_eq!(derive_client_id(&headers), "198.51.100.7");

    headers.remove("x-real-ip");
    assert_eq!(derive_client_id(&headers), "unknown");
}

#[test]
fn test_decision_header_contract() {
    let decision = RateLimitDecision {
        allowed: true,
        limit: 30,
        remaining: 12,
        reset_at_ms: chrono::Utc::now().timestamp_millis() + 45_000,
    };
    let headers = decision_headers(&decision);

    assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "30");
    assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "12");

    let reset: i64 = headers
        .get("x-ratelimit-reset")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(reset, decision.reset_at_ms / 1000);

    let retry_after: i64 = headers
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=46).contains(&retry_after));
}
