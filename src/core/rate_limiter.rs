//! Database-backed fixed-window rate limiting.
//!
//! Counters live in the shared `rate_limits` table so that independent,
//! stateless invocations of the service enforce one combined limit per
//! (client, endpoint) pair. The limiter fails open: if the counter store
//! is unreachable, requests are admitted rather than blocked.

use async_trait::async_trait;
use axum::http::{header::RETRY_AFTER, HeaderMap, HeaderValue};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;

use crate::core::metrics::get_metrics;

/// Protected operations with compiled-in policies.
///
/// The set is closed so an unrecognized endpoint name is unrepresentable;
/// the deployment chat entry point shares the `AiChat` bucket with the
/// universal processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    AiChat,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::AiChat => "ai-chat",
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        match self {
            Endpoint::AiChat => RateLimitPolicy {
                max_requests: 30,
                window_millis: 60_000,
            },
        }
    }
}

/// Static per-endpoint policy: `max_requests` per fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_millis: i64,
}

/// One row per (client, endpoint) pair in the counter store.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RateLimitRecord {
    pub client_id: String,
    pub endpoint: String,
    pub request_count: i32,
    pub window_start_ms: i64,
}

/// The outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Window end in epoch milliseconds
    pub reset_at_ms: i64,
}

/// Infrastructure failure at the counter store boundary.
///
/// Callers of [`RateLimiter::check`] never see this type; it exists so the
/// fail-open mapping is an explicit branch rather than an implicit catch-all.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Storage boundary for rate-limit counters and overage audit events.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn fetch(
        &self,
        client_id: &str,
        endpoint: &str,
    ) -> Result<Option<RateLimitRecord>, InfraError>;

    /// Upsert on (client_id, endpoint).
    async fn put(&self, record: &RateLimitRecord) -> Result<(), InfraError>;

    /// Append a security event for an over-limit request.
    async fn record_overage(
        &self,
        client_id: &str,
        endpoint: &str,
        request_count: i32,
    ) -> Result<(), InfraError>;
}

/// Fixed-window rate limiter over a shared counter store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Check whether a request from `client_id` against `endpoint` is admitted.
    ///
    /// Infrastructure errors fail open: availability of the product is
    /// prioritized over strict enforcement, and the caller cannot
    /// distinguish "under limit" from "limiter unavailable".
    pub async fn check(&self, client_id: &str, endpoint: Endpoint) -> RateLimitDecision {
        let now_ms = Utc::now().timestamp_millis();
        match self.check_at(client_id, endpoint, now_ms).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(
                    client_id = %client_id,
                    endpoint = endpoint.as_str(),
                    error = %e,
                    "Rate limit store unavailable, failing open"
                );
                let policy = endpoint.policy();
                RateLimitDecision {
                    allowed: true,
                    limit: policy.max_requests,
                    remaining: policy.max_requests.saturating_sub(1),
                    reset_at_ms: now_ms + policy.window_millis,
                }
            }
        }
    }

    /// Fixed-window check against an explicit clock, for testability.
    ///
    /// The read-modify-write sequence here is not atomic: two concurrent
    /// requests from the same client can both observe a count below the
    /// limit and both increment, briefly overshooting `max_requests`.
    pub async fn check_at(
        &self,
        client_id: &str,
        endpoint: Endpoint,
        now_ms: i64,
    ) -> Result<RateLimitDecision, InfraError> {
        let policy = endpoint.policy();
        let existing = self.store.fetch(client_id, endpoint.as_str()).await?;

        match existing {
            Some(record) if now_ms - record.window_start_ms < policy.window_millis => {
                if record.request_count >= policy.max_requests as i32 {
                    let reset_at_ms = record.window_start_ms + policy.window_millis;
                    tracing::warn!(
                        client_id = %client_id,
                        endpoint = endpoint.as_str(),
                        request_count = record.request_count,
                        "Rate limit exceeded"
                    );
                    get_metrics()
                        .rate_limit_rejections
                        .with_label_values(&[endpoint.as_str()])
                        .inc();

                    // Audit append is best-effort; it must not change the verdict.
                    if let Err(e) = self
                        .store
                        .record_overage(client_id, endpoint.as_str(), record.request_count)
                        .await
                    {
                        tracing::warn!(error = %e, "Failed to record rate limit overage");
                    }

                    return Ok(RateLimitDecision {
                        allowed: false,
                        limit: policy.max_requests,
                        remaining: 0,
                        reset_at_ms,
                    });
                }

                let updated = RateLimitRecord {
                    request_count: record.request_count + 1,
                    ..record
                };
                self.store.put(&updated).await?;

                Ok(RateLimitDecision {
                    allowed: true,
                    limit: policy.max_requests,
                    remaining: policy.max_requests.saturating_sub(updated.request_count as u32),
                    reset_at_ms: updated.window_start_ms + policy.window_millis,
                })
            }
            // No record, or the previous window has expired: start a new one.
            _ => {
                let record = RateLimitRecord {
                    client_id: client_id.to_string(),
                    endpoint: endpoint.as_str().to_string(),
                    request_count: 1,
                    window_start_ms: now_ms,
                };
                self.store.put(&record).await?;

                Ok(RateLimitDecision {
                    allowed: true,
                    limit: policy.max_requests,
                    remaining: policy.max_requests.saturating_sub(1),
                    reset_at_ms: now_ms + policy.window_millis,
                })
            }
        }
    }
}

/// Postgres-backed counter store over the `rate_limits` table.
pub struct PgRateLimitStore {
    pool: PgPool,
}

impl PgRateLimitStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitStore for PgRateLimitStore {
    async fn fetch(
        &self,
        client_id: &str,
        endpoint: &str,
    ) -> Result<Option<RateLimitRecord>, InfraError> {
        let record = sqlx::query_as::<_, RateLimitRecord>(
            r#"
            SELECT ip_address AS client_id, endpoint, request_count, window_start AS window_start_ms
            FROM rate_limits
            WHERE ip_address = $1 AND endpoint = $2
            "#,
        )
        .bind(client_id)
        .bind(endpoint)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn put(&self, record: &RateLimitRecord) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            INSERT INTO rate_limits (ip_address, endpoint, request_count, window_start, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (ip_address, endpoint)
            DO UPDATE SET request_count = EXCLUDED.request_count,
                          window_start = EXCLUDED.window_start,
                          updated_at = NOW()
            "#,
        )
        .bind(&record.client_id)
        .bind(&record.endpoint)
        .bind(record.request_count)
        .bind(record.window_start_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_overage(
        &self,
        client_id: &str,
        endpoint: &str,
        request_count: i32,
    ) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            INSERT INTO security_events (event_type, client_id, endpoint, detail, created_at)
            VALUES ('rate_limit_exceeded', $1, $2, $3, NOW())
            "#,
        )
        .bind(client_id)
        .bind(endpoint)
        .bind(format!("request_count={}", request_count))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Delete counter rows whose window ended more than `older_than_ms` ago.
///
/// Stale rows are never purged on the request path; this runs from a
/// periodic background task.
pub async fn sweep_stale(pool: &PgPool, older_than_ms: i64) -> Result<u64, sqlx::Error> {
    let cutoff = Utc::now().timestamp_millis() - older_than_ms;
    let result = sqlx::query("DELETE FROM rate_limits WHERE window_start < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Derive the rate-limit client identity from forwarded headers.
///
/// First entry of `x-forwarded-for`, else `x-real-ip`, else "unknown".
/// Clients behind one proxy share a bucket and spoofed headers evade it;
/// network-layer identity is out of scope here.
pub fn derive_client_id(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    "unknown".to_string()
}

/// Build the outbound rate-limit headers for a decision.
///
/// Attached to every response for which a decision was made, allowed or not.
pub fn decision_headers(decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let reset_epoch_secs = decision.reset_at_ms / 1000;
    let retry_after_secs =
        ((decision.reset_at_ms - Utc::now().timestamp_millis()).max(0) + 999) / 1000;

    headers.insert(
        "x-ratelimit-limit",
        HeaderValue::from_str(&decision.limit.to_string()).unwrap_or(HeaderValue::from_static("0")),
    );
    headers.insert(
        "x-ratelimit-remaining",
        HeaderValue::from_str(&decision.remaining.to_string())
            .unwrap_or(HeaderValue::from_static("0")),
    );
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from_str(&reset_epoch_secs.to_string())
            .unwrap_or(HeaderValue::from_static("0")),
    );
    headers.insert(
        RETRY_AFTER,
        HeaderValue::from_str(&retry_after_secs.to_string())
            .unwrap_or(HeaderValue::from_static("0")),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory store for exercising the window algorithm.
    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<HashMap<(String, String), RateLimitRecord>>,
        overages: Mutex<Vec<String>>,
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
            let mut records = self.records.lock().await;
            records.insert(
                (record.client_id.clone(), record.endpoint.clone()),
                record.clone(),
            );
            Ok(())
        }

        async fn record_overage(
            &self,
            client_id: &str,
            _endpoint: &str,
            _request_count: i32,
        ) -> Result<(), InfraError> {
            self.overages.lock().await.push(client_id.to_string());
            Ok(())
        }
    }

    /// Store that always fails, to exercise the fail-open branch.
    struct BrokenStore;

    #[async_trait]
    impl RateLimitStore for BrokenStore {
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
    async fn test_allows_within_limit_with_decreasing_remaining() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::default()));
        let limit = Endpoint::AiChat.policy().max_requests;

        for i in 0..limit {
            let decision = limiter.check_at("1.2.3.4", Endpoint::AiChat, 1_000).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, limit - 1 - i);
        }
    }

    #[tokio::test]
    async fn test_rejects_over_limit_with_reset() {
        let store = Arc::new(MemoryStore::default());
        let limiter = RateLimiter::new(store.clone());
        let policy = Endpoint::AiChat.policy();

        for _ in 0..policy.max_requests {
            assert!(limiter
                .check_at("1.2.3.4", Endpoint::AiChat, 1_000)
                .await
                .unwrap()
                .allowed);
        }

        let decision = limiter.check_at("1.2.3.4", Endpoint::AiChat, 2_000).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at_ms, 1_000 + policy.window_millis);

        // Overage was audited
        assert_eq!(store.overages.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_window_rollover_resets_count() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::default()));
        let policy = Endpoint::AiChat.policy();

        for _ in 0..policy.max_requests {
            limiter.check_at("1.2.3.4", Endpoint::AiChat, 1_000).await.unwrap();
        }
        assert!(!limiter
            .check_at("1.2.3.4", Endpoint::AiChat, 2_000)
            .await
            .unwrap()
            .allowed);

        // A call past the window end starts fresh
        let later = 1_000 + policy.window_millis;
        let decision = limiter.check_at("1.2.3.4", Endpoint::AiChat, later).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, policy.max_requests - 1);
    }

    #[tokio::test]
    async fn test_clients_have_independent_buckets() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::default()));
        let policy = Endpoint::AiChat.policy();

        for _ in 0..policy.max_requests {
            limiter.check_at("1.1.1.1", Endpoint::AiChat, 1_000).await.unwrap();
        }
        assert!(!limiter
            .check_at("1.1.1.1", Endpoint::AiChat, 2_000)
            .await
            .unwrap()
            .allowed);
        assert!(limiter
            .check_at("2.2.2.2", Endpoint::AiChat, 2_000)
            .await
            .unwrap()
            .allowed);
    }

    #[tokio::test]
    async fn test_fail_open_on_store_error() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore));

        // Regardless of call history, a broken store admits everything
        for _ in 0..100 {
            let decision = limiter.check("1.2.3.4", Endpoint::AiChat).await;
            assert!(decision.allowed);
        }
    }

    #[test]
    fn test_derive_client_id_forwarded_for_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.5, 10.0.0.1"),
        );
        assert_eq!(derive_client_id(&headers), "203.0.113.5");
    }

    #[test]
    fn test_derive_client_id_real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(derive_client_id(&headers), "198.51.100.7");
    }

    #[test]
    fn test_derive_client_id_unknown_fallback() {
        assert_eq!(derive_client_id(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn test_decision_headers_present() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 30,
            remaining: 0,
            reset_at_ms: Utc::now().timestamp_millis() + 30_000,
        };
        let headers = decision_headers(&decision);
        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "30");
        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "0");
        assert!(headers.contains_key("x-ratelimit-reset"));
        assert!(headers.contains_key(RETRY_AFTER));
    }
}
