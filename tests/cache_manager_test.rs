//! Tests for [`ApiCacheManager`]: TTL, stale-while-revalidate, in-flight
//! deduplication and cancellation.
//!
//! Time-dependent tests run on a paused tokio clock; `sleep` auto-advances
//! once every task is idle.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use insightkit::{ApiCacheManager, EndpointConfig, InsightError, Result, cancellable};
use serde_json::json;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Helpers
// ============================================================================

/// A fetch function that counts its calls, waits `delay`, then yields `value`.
fn fetcher<A, T>(
    calls: &Arc<AtomicUsize>,
    value: T,
    delay: Duration,
) -> impl FnOnce(A, CancellationToken) -> BoxFuture<'static, Result<T>> + use<A, T>
where
    T: Send + 'static,
{
    let calls = Arc::clone(calls);
    move |_, _| {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok(value)
        }
        .boxed()
    }
}

/// A fetch function that counts its calls, waits `delay`, then fails.
fn failing<A>(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
) -> impl FnOnce(A, CancellationToken) -> BoxFuture<'static, Result<u32>> {
    let calls = Arc::clone(calls);
    move |_, _| {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Err(InsightError::Api {
                status: 503,
                message: "unavailable".into(),
            })
        }
        .boxed()
    }
}

/// A fetch function that never finishes unless cancelled.
fn hanging<A>(calls: &Arc<AtomicUsize>) -> impl FnOnce(A, CancellationToken) -> BoxFuture<'static, Result<u32>> {
    let calls = Arc::clone(calls);
    move |_, token| {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            cancellable(&token, std::future::pending()).await
        }
        .boxed()
    }
}

async fn explode() -> Result<u32> {
    panic!("boom")
}

fn explode_early(_: (), _: CancellationToken) -> std::future::Ready<Result<u32>> {
    panic!("boom before the future exists")
}

async fn wait_until_pending(cache: &ApiCacheManager, endpoint: &str, args: &str) {
    for _ in 0..100 {
        if cache.is_pending(endpoint, args).unwrap() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("fetch for {endpoint} never became pending");
}

const MS: Duration = Duration::from_millis(1);

// ============================================================================
// Freshness
// ============================================================================

#[tokio::test(start_paused = true)]
async fn fresh_entry_skips_fetch() {
    let cache = ApiCacheManager::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let first: u32 = cache.fetch("workspaces", "tok", fetcher(&calls, 1, MS)).await.unwrap();
    let second: u32 = cache.fetch("workspaces", "tok", fetcher(&calls, 2, MS)).await.unwrap();

    assert_eq!(first, 1);
    assert_eq!(second, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_entry_refetches_without_stale_serving() {
    let cache = ApiCacheManager::new();
    cache.configure(
        "messages",
        EndpointConfig::new()
            .ttl(Duration::from_secs(10))
            .stale_while_revalidate(false),
    );
    let calls = Arc::new(AtomicUsize::new(0));

    let _: u32 = cache.fetch("messages", 7, fetcher(&calls, 1, MS)).await.unwrap();

    tokio::time::advance(Duration::from_secs(9)).await;
    let still_fresh: u32 = cache.fetch("messages", 7, fetcher(&calls, 2, MS)).await.unwrap();
    assert_eq!(still_fresh, 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    let refetched: u32 = cache.fetch("messages", 7, fetcher(&calls, 3, MS)).await.unwrap();
    assert_eq!(refetched, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn unbounded_ttl_is_stored_and_settles() {
    let cache = ApiCacheManager::new();
    cache.configure("workspaces", EndpointConfig::new().ttl(Duration::MAX));
    let calls = Arc::new(AtomicUsize::new(0));

    let first: u32 = cache.fetch("workspaces", "tok", fetcher(&calls, 1, MS)).await.unwrap();
    assert_eq!(first, 1);
    assert!(!cache.is_pending("workspaces", "tok").unwrap());
    assert_eq!(cache.stats().per_endpoint["workspaces"].pending, 0);
    assert_eq!(cache.stats().per_endpoint["workspaces"].cached, 1);

    tokio::time::advance(Duration::from_secs(365 * 24 * 60 * 60)).await;
    let second: u32 = cache.fetch("workspaces", "tok", fetcher(&calls, 2, MS)).await.unwrap();
    assert_eq!(second, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn per_call_override_wins_over_endpoint_policy() {
    let cache = ApiCacheManager::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let short = EndpointConfig::new()
        .ttl(Duration::from_secs(1))
        .stale_while_revalidate(false);

    let _: u32 = cache
        .fetch_with_config("datasets", "ws", Some(short), fetcher(&calls, 1, MS))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;
    let value: u32 = cache
        .fetch_with_config("datasets", "ws", Some(short), fetcher(&calls, 2, MS))
        .await
        .unwrap();

    assert_eq!(value, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn args_are_keyed_structurally() {
    let cache = ApiCacheManager::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let _: u32 = cache
        .fetch("datasets", json!({"workspace": "w1", "page": 1}), fetcher(&calls, 1, MS))
        .await
        .unwrap();
    let _: u32 = cache
        .fetch("datasets", json!({"page": 1, "workspace": "w1"}), fetcher(&calls, 2, MS))
        .await
        .unwrap();
    let other: u32 = cache
        .fetch("datasets", json!({"page": 2, "workspace": "w1"}), fetcher(&calls, 3, MS))
        .await
        .unwrap();

    assert_eq!(other, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn wrong_type_for_key_is_error() {
    let cache = ApiCacheManager::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let _: u32 = cache.fetch("workspaces", (), fetcher(&calls, 1, MS)).await.unwrap();
    let err = cache
        .fetch::<String, _, _, _>("workspaces", (), fetcher(&calls, "x".to_string(), MS))
        .await
        .unwrap_err();

    assert!(matches!(err, InsightError::TypeMismatch { endpoint } if endpoint == "workspaces"));
}

// ============================================================================
// Stale-while-revalidate
// ============================================================================

#[tokio::test(start_paused = true)]
async fn stale_entry_is_served_and_refreshed_in_background() {
    let cache = ApiCacheManager::new();
    cache.configure("datasets", EndpointConfig::new().ttl(Duration::from_secs(10)));
    let calls = Arc::new(AtomicUsize::new(0));

    let _: u32 = cache.fetch("datasets", "ws", fetcher(&calls, 1, MS)).await.unwrap();
    tokio::time::advance(Duration::from_secs(11)).await;

    let stale: u32 = cache
        .fetch("datasets", "ws", fetcher(&calls, 2, Duration::from_millis(100)))
        .await
        .unwrap();
    assert_eq!(stale, 1);
    wait_until_pending(&cache, "datasets", "ws").await;

    // A second stale read does not start another refresh.
    let stale_again: u32 = cache.fetch("datasets", "ws", fetcher(&calls, 9, MS)).await.unwrap();
    assert_eq!(stale_again, 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!cache.is_pending("datasets", "ws").unwrap());

    let refreshed: u32 = cache.fetch("datasets", "ws", fetcher(&calls, 3, MS)).await.unwrap();
    assert_eq!(refreshed, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_background_refresh_keeps_stale_entry() {
    let cache = ApiCacheManager::new();
    cache.configure("datasets", EndpointConfig::new().ttl(Duration::from_secs(10)));
    let calls = Arc::new(AtomicUsize::new(0));

    let _: u32 = cache.fetch("datasets", "ws", fetcher(&calls, 1, MS)).await.unwrap();
    tokio::time::advance(Duration::from_secs(11)).await;

    let stale: u32 = cache
        .fetch("datasets", "ws", failing(&calls, Duration::from_millis(50)))
        .await
        .unwrap();
    assert_eq!(stale, 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!cache.is_pending("datasets", "ws").unwrap());

    // Still stale, still served, another refresh starts.
    let again: u32 = cache.fetch("datasets", "ws", fetcher(&calls, 2, MS)).await.unwrap();
    assert_eq!(again, 1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(cache.stats().per_endpoint["datasets"].cached, 1);
}

// ============================================================================
// Deduplication
// ============================================================================

#[tokio::test(start_paused = true)]
async fn concurrent_identical_fetches_share_one_call() {
    let cache = ApiCacheManager::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let delay = Duration::from_millis(100);

    let (a, b, c) = tokio::join!(
        cache.fetch::<u32, _, _, _>("workspaces", "tok", fetcher(&calls, 1, delay)),
        cache.fetch::<u32, _, _, _>("workspaces", "tok", fetcher(&calls, 2, delay)),
        cache.fetch::<u32, _, _, _>("workspaces", "tok", fetcher(&calls, 3, delay)),
    );

    assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (1, 1, 1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_fetches_with_different_args_do_not_share() {
    let cache = ApiCacheManager::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let delay = Duration::from_millis(100);

    let a = tokio::spawn({
        let cache = cache.clone();
        let fetch_fn = fetcher(&calls, 1u32, delay);
        async move { cache.fetch("datasets", "a", fetch_fn).await }
    });
    let b = tokio::spawn({
        let cache = cache.clone();
        let fetch_fn = fetcher(&calls, 2u32, delay);
        async move { cache.fetch("datasets", "b", fetch_fn).await }
    });

    wait_until_pending(&cache, "datasets", "a").await;
    wait_until_pending(&cache, "datasets", "b").await;
    assert_eq!(cache.stats().per_endpoint["datasets"].pending, 2);

    assert_eq!(a.await.unwrap().unwrap(), 1);
    assert_eq!(b.await.unwrap().unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let (a, b) = tokio::join!(
        cache.fetch::<u32, _, _, _>("datasets", "a", fetcher(&calls, 3, delay)),
        cache.fetch::<u32, _, _, _>("datasets", "b", fetcher(&calls, 4, delay)),
    );
    assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn shared_failure_reaches_every_waiter_and_is_not_cached() {
    let cache = ApiCacheManager::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let delay = Duration::from_millis(100);

    let (a, b) = tokio::join!(
        cache.fetch::<u32, _, _, _>("workspaces", "tok", failing(&calls, delay)),
        cache.fetch::<u32, _, _, _>("workspaces", "tok", fetcher(&calls, 5, delay)),
    );
    assert!(matches!(a.unwrap_err(), InsightError::Api { status: 503, .. }));
    assert!(matches!(b.unwrap_err(), InsightError::Api { status: 503, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let retried: u32 = cache.fetch("workspaces", "tok", fetcher(&calls, 6, MS)).await.unwrap();
    assert_eq!(retried, 6);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn dedup_disabled_runs_every_fetch() {
    let cache = ApiCacheManager::new();
    cache.configure("messages", EndpointConfig::new().deduplicate(false));
    let calls = Arc::new(AtomicUsize::new(0));
    let delay = Duration::from_millis(100);

    let (a, b) = tokio::join!(
        cache.fetch::<u32, _, _, _>("messages", 1, fetcher(&calls, 1, delay)),
        cache.fetch::<u32, _, _, _>("messages", 1, fetcher(&calls, 2, delay)),
    );

    assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn panicking_fetch_settles_as_error() {
    let cache = ApiCacheManager::new();
    let err = cache
        .fetch::<u32, _, _, _>("workspaces", (), |_, _| explode())
        .await
        .unwrap_err();
    assert!(matches!(err, InsightError::Fetch(_)));
    assert!(!cache.is_pending("workspaces", &()).unwrap());
}

#[tokio::test(start_paused = true)]
async fn panic_before_future_is_built_settles_as_error() {
    let cache = ApiCacheManager::new();
    let err = cache
        .fetch::<u32, _, _, _>("workspaces", (), explode_early)
        .await
        .unwrap_err();
    assert!(matches!(err, InsightError::Fetch(_)));
    assert!(!cache.is_pending("workspaces", &()).unwrap());
    assert_eq!(cache.stats().per_endpoint["workspaces"].pending, 0);
}

#[tokio::test(start_paused = true)]
async fn fetch_function_may_call_back_into_manager() {
    let cache = ApiCacheManager::new();
    let handle = cache.clone();

    let value: u32 = cache
        .fetch("workspaces", "tok", move |_, _| {
            let pending = handle.stats().per_endpoint["workspaces"].pending;
            let joinable = handle.is_pending("workspaces", "tok").unwrap();
            async move { Ok::<_, InsightError>(if joinable { pending as u32 } else { 0 }) }
        })
        .await
        .unwrap();

    assert_eq!(value, 1);
    assert!(!cache.is_pending("workspaces", "tok").unwrap());
}

#[tokio::test(start_paused = true)]
async fn fetch_function_may_cancel_its_own_endpoint() {
    let cache = ApiCacheManager::new();
    let handle = cache.clone();

    let err = cache
        .fetch::<u32, _, _, _>("datasets", "a", move |_, token| {
            handle.cancel_pending("datasets");
            async move { cancellable(&token, std::future::pending()).await }
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(!cache.is_pending("datasets", "a").unwrap());
    assert_eq!(cache.stats().per_endpoint.get("datasets"), None);
}

// ============================================================================
// Invalidation and cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn invalidate_removes_one_key() {
    let cache = ApiCacheManager::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let _: u32 = cache.fetch("datasets", "a", fetcher(&calls, 1, MS)).await.unwrap();
    let _: u32 = cache.fetch("datasets", "b", fetcher(&calls, 1, MS)).await.unwrap();
    cache.invalidate("datasets", "a").unwrap();

    let a: u32 = cache.fetch("datasets", "a", fetcher(&calls, 2, MS)).await.unwrap();
    let b: u32 = cache.fetch("datasets", "b", fetcher(&calls, 2, MS)).await.unwrap();
    assert_eq!((a, b), (2, 1));

    // Absent keys are a no-op.
    cache.invalidate("datasets", "missing").unwrap();
}

#[tokio::test(start_paused = true)]
async fn invalidate_all_is_scoped_to_endpoint() {
    let cache = ApiCacheManager::new();
    let calls = Arc::new(AtomicUsize::new(0));

    for args in ["a", "b"] {
        let _: u32 = cache.fetch("datasets", args, fetcher(&calls, 1, MS)).await.unwrap();
    }
    let _: u32 = cache.fetch("workspaces", "a", fetcher(&calls, 1, MS)).await.unwrap();

    cache.invalidate_all("datasets");

    let stats = cache.stats();
    assert_eq!(stats.per_endpoint.get("datasets").map_or(0, |s| s.cached), 0);
    assert_eq!(stats.per_endpoint["workspaces"].cached, 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_pending_aborts_in_flight_fetch() {
    let cache = ApiCacheManager::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let task = tokio::spawn({
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        async move { cache.fetch::<u32, _, _, _>("messages", "chat-1", hanging(&calls)).await }
    });
    wait_until_pending(&cache, "messages", "chat-1").await;
    assert_eq!(cache.stats().per_endpoint["messages"].pending, 1);

    cache.cancel_pending("messages");

    let err = task.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(!cache.is_pending("messages", "chat-1").unwrap());
    assert_eq!(cache.stats().per_endpoint["messages"].pending, 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_pending_leaves_other_endpoints_running() {
    let cache = ApiCacheManager::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let slow = tokio::spawn({
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        async move {
            cache
                .fetch::<u32, _, _, _>("datasets", "ws", fetcher(&calls, 4, Duration::from_millis(50)))
                .await
        }
    });
    wait_until_pending(&cache, "datasets", "ws").await;

    cache.cancel_pending("messages");
    assert_eq!(slow.await.unwrap().unwrap(), 4);
}

#[tokio::test(start_paused = true)]
async fn result_of_cancelled_fetch_is_not_stored() {
    let cache = ApiCacheManager::new();
    let calls = Arc::new(AtomicUsize::new(0));

    // Ignores its token and completes anyway.
    let task = tokio::spawn({
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        async move {
            cache
                .fetch::<u32, _, _, _>("datasets", "ws", fetcher(&calls, 1, Duration::from_millis(50)))
                .await
        }
    });
    wait_until_pending(&cache, "datasets", "ws").await;
    cache.cancel_pending("datasets");

    assert_eq!(task.await.unwrap().unwrap(), 1);
    let next: u32 = cache.fetch("datasets", "ws", fetcher(&calls, 2, MS)).await.unwrap();
    assert_eq!(next, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn clear_all_cancels_and_empties() {
    let cache = ApiCacheManager::new();
    cache.configure("workspaces", EndpointConfig::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let _: u32 = cache.fetch("datasets", "ws", fetcher(&calls, 1, MS)).await.unwrap();
    let task = tokio::spawn({
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        async move { cache.fetch::<u32, _, _, _>("messages", "m", hanging(&calls)).await }
    });
    wait_until_pending(&cache, "messages", "m").await;

    cache.clear_all();

    assert!(task.await.unwrap().unwrap_err().is_cancelled());
    let stats = cache.stats();
    assert!(stats.per_endpoint.values().all(|s| s.cached == 0 && s.pending == 0));
    // Configuration survives a reset.
    assert!(stats.endpoints.contains(&"workspaces".to_string()));

    let refetched: u32 = cache.fetch("datasets", "ws", fetcher(&calls, 2, MS)).await.unwrap();
    assert_eq!(refetched, 2);
}

// ============================================================================
// Stats
// ============================================================================

#[tokio::test(start_paused = true)]
async fn stats_lists_configured_cached_and_pending_endpoints() {
    let cache = ApiCacheManager::new();
    cache.configure("workspaces", EndpointConfig::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let _: u32 = cache.fetch("datasets", "a", fetcher(&calls, 1, MS)).await.unwrap();
    let _: u32 = cache.fetch("datasets", "b", fetcher(&calls, 1, MS)).await.unwrap();

    let stats = cache.stats();
    assert_eq!(stats.endpoints, vec!["datasets".to_string(), "workspaces".to_string()]);
    assert_eq!(stats.per_endpoint["datasets"].cached, 2);
    assert_eq!(stats.per_endpoint["workspaces"].cached, 0);
}
