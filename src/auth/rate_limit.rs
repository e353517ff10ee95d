use actix_web::http::header::HeaderMap;
use chrono::Duration;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, warn};

use crate::clock::Clock;
use crate::config;
use crate::db::{RateKey, RateWindowStore};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: i64,
    pub window: Duration,
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::seconds(60),
            trust_forwarded_for: true,
        }
    }
}

impl From<&config::RateLimitConfig> for RateLimitConfig {
    fn from(config: &config::RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::seconds(config.window_secs),
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny,
}

/// Sliding-window request counter per (client, endpoint), kept in the
/// shared store so every worker and instance sees the same budget.
pub struct RateLimiter {
    store: Arc<dyn RateWindowStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateWindowStore>, clock: Arc<dyn Clock>, config: RateLimitConfig) -> Self {
        Self { store, clock, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn retry_after_secs(&self) -> i64 {
        self.config.window.num_seconds()
    }

    /// Counts the request and decides whether it fits the budget.
    /// Store failures admit the request; they are only logged.
    pub async fn admit(&self, client_key: &str, endpoint: &str) -> Admission {
        let key = RateKey::new(client_key, endpoint);
        match self
            .store
            .record_hit(&key, self.clock.now(), self.config.window)
            .await
        {
            Ok(count) if count > self.config.max_requests => {
                warn!(client = client_key, endpoint, count, "rate limit exceeded");
                Admission::Deny
            }
            Ok(_) => Admission::Allow,
            Err(e) => {
                error!(error = %e, client = client_key, endpoint, "rate limit check failed, admitting request");
                Admission::Allow
            }
        }
    }
}

/// Identifies the caller: the first `X-Forwarded-For` hop, then `X-Real-IP`,
/// then the transport peer. Forwarded headers are client-controlled unless a
/// trusted proxy overwrites them.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = real_ip {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// The endpoint half of the rate key, e.g. `GET /ledger`.
pub fn endpoint_key(method: &str, path: &str) -> String {
    format!("{method} {path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::{MemoryStore, MockRateWindowStore};
    use crate::error::DatabaseError;
    use actix_web::http::header::HeaderValue;

    fn limiter(store: Arc<dyn RateWindowStore>, clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::new(store, clock, RateLimitConfig::default())
    }

    #[tokio::test]
    async fn budget_is_enforced_and_resets_after_window() {
        let clock = Arc::new(ManualClock::default());
        let limiter = limiter(Arc::new(MemoryStore::new()), clock.clone());

        for _ in 0..60 {
            assert_eq!(limiter.admit("1.2.3.4", "GET /ledger").await, Admission::Allow);
        }
        assert_eq!(limiter.admit("1.2.3.4", "GET /ledger").await, Admission::Deny);

        clock.advance(Duration::seconds(60));
        assert_eq!(limiter.admit("1.2.3.4", "GET /ledger").await, Admission::Allow);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let clock = Arc::new(ManualClock::default());
        let limiter = limiter(Arc::new(MemoryStore::new()), clock);

        for _ in 0..61 {
            limiter.admit("1.2.3.4", "GET /ledger").await;
        }
        assert_eq!(limiter.admit("1.2.3.4", "GET /ledger").await, Admission::Deny);
        assert_eq!(limiter.admit("1.2.3.4", "POST /ledger").await, Admission::Allow);
        assert_eq!(limiter.admit("5.6.7.8", "GET /ledger").await, Admission::Allow);
    }

    #[tokio::test]
    async fn store_failure_fails_open() {
        let mut store = MockRateWindowStore::new();
        store
            .expect_record_hit()
            .times(3)
            .returning(|_, _, _| Err(DatabaseError::ConnectionError("connection refused".into())));

        let limiter = limiter(Arc::new(store), Arc::new(ManualClock::default()));
        for _ in 0..3 {
            assert_eq!(limiter.admit("1.2.3.4", "GET /ledger").await, Admission::Allow);
        }
    }

    #[tokio::test]
    async fn count_above_budget_denies() {
        let mut store = MockRateWindowStore::new();
        store.expect_record_hit().returning(|_, _, _| Ok(61));
        let limiter = limiter(Arc::new(store), Arc::new(ManualClock::default()));
        assert_eq!(limiter.admit("1.2.3.4", "GET /ledger").await, Admission::Deny);
    }

    #[test]
    fn client_key_prefers_first_forwarded_hop() {
        let peer: SocketAddr = "10.0.0.1:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers, Some(peer), true), "10.0.0.1");

        headers.insert(
            "x-real-ip".parse().unwrap(),
            HeaderValue::from_static("9.9.9.9"),
        );
        assert_eq!(client_key(&headers, Some(peer), true), "9.9.9.9");

        headers.insert(
            "x-forwarded-for".parse().unwrap(),
            HeaderValue::from_static("1.2.3.4, 172.16.0.1"),
        );
        assert_eq!(client_key(&headers, Some(peer), true), "1.2.3.4");
        assert_eq!(client_key(&headers, Some(peer), false), "10.0.0.1");
        assert_eq!(client_key(&HeaderMap::new(), None, true), "unknown");
    }
}
