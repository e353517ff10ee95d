use chrono::Utc;
use futures::future::join_all;
use ledger_server::auth::{Admission, RateLimitConfig, RateLimiter};
use ledger_server::clock::ManualClock;
use ledger_server::db::{MemoryStore, RateKey};
use std::sync::Arc;

fn limiter(store: &MemoryStore, max_requests: i64) -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(
        Arc::new(store.clone()),
        Arc::new(ManualClock::new(Utc::now())),
        RateLimitConfig {
            max_requests,
            ..RateLimitConfig::default()
        },
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admissions_are_all_counted() {
    let store = MemoryStore::new();
    let limiter = limiter(&store, 1_000);

    let tasks = (0..200).map(|_| {
        let limiter = limiter.clone();
        tokio::spawn(async move { limiter.admit("10.1.1.1", "GET /ledger").await })
    });
    let results = join_all(tasks).await;

    assert!(results
        .into_iter()
        .all(|r| r.expect("task panicked") == Admission::Allow));
    let window = store
        .rate_window(&RateKey::new("10.1.1.1", "GET /ledger"))
        .await
        .expect("window row");
    assert_eq!(window.request_count, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_burst_admits_exactly_the_budget() {
    let store = MemoryStore::new();
    let limiter = limiter(&store, 60);

    let tasks = (0..100).map(|_| {
        let limiter = limiter.clone();
        tokio::spawn(async move { limiter.admit("10.2.2.2", "POST /ledger").await })
    });
    let allowed = join_all(tasks)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Admission::Allow)))
        .count();

    assert_eq!(allowed, 60);
}
