//! Endpoint-keyed request cache with in-flight deduplication.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CacheKey, EndpointConfig};
use crate::config::CacheSettings;
use crate::telemetry;
use crate::{InsightError, Result};

/// Default upper bound on stored entries across all endpoints.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

type Payload = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<Payload>>>;

/// A stored fetch result. Never mutated; a refresh replaces it.
#[derive(Clone)]
struct CacheEntry {
    payload: Payload,
    created_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Where a fetch was started from. Only affects logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Caller,
    Background,
}

/// Outcome of the synchronous lookup step of a fetch.
enum Lookup {
    Cached(Payload),
    Wait(SharedFetch),
    /// Serve the stale payload and launch a background refresh.
    Refresh(Payload, Launch),
    /// Launch a new fetch and wait for it.
    Fetch(SharedFetch, Launch),
}

/// A registered fetch whose function has not been called yet.
///
/// Produced under the pending lock, consumed after it is released.
struct Launch {
    key: CacheKey,
    generation: u64,
    ttl: Duration,
    origin: Origin,
    cancel: CancellationToken,
    done: oneshot::Sender<Result<Payload>>,
}

/// Expiry for an entry written at `now`, saturating for huge TTLs.
fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Stand-in lifetime for TTLs too large to represent as an instant.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A joinable in-flight fetch for one key.
struct InFlight {
    future: SharedFetch,
    generation: u64,
}

/// Cancellation handle for every outstanding fetch, deduplicated or not.
struct Registration {
    endpoint: String,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Pending {
    by_key: HashMap<CacheKey, InFlight>,
    tokens: HashMap<u64, Registration>,
}

struct Inner {
    entries: moka::sync::Cache<CacheKey, CacheEntry>,
    pending: Mutex<Pending>,
    configs: RwLock<HashMap<String, EndpointConfig>>,
    default_config: EndpointConfig,
    next_generation: AtomicU64,
}

impl Inner {
    fn lock_pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the bookkeeping of a finished fetch and record its outcome.
    ///
    /// Both happen under the pending lock, so no caller can observe the
    /// fetch as neither pending nor stored.
    fn settle(
        &self,
        key: &CacheKey,
        generation: u64,
        ttl: Duration,
        origin: Origin,
        result: &Result<Payload>,
    ) {
        let mut pending = self.lock_pending();
        let cancelled = pending
            .tokens
            .remove(&generation)
            .is_none_or(|r| r.cancel.is_cancelled());
        if pending
            .by_key
            .get(key)
            .is_some_and(|f| f.generation == generation)
        {
            pending.by_key.remove(key);
        }
        let endpoint = key.endpoint().to_owned();

        match result {
            Ok(payload) if !cancelled => {
                let now = Instant::now();
                self.entries.insert(
                    key.clone(),
                    CacheEntry {
                        payload: Arc::clone(payload),
                        created_at: now,
                        expires_at: expiry(now, ttl),
                    },
                );
                debug!(endpoint = %endpoint, ?origin, "stored fetch result");
            }
            Ok(_) => {
                debug!(endpoint = %endpoint, "discarding result of cancelled fetch");
            }
            Err(e) if e.is_cancelled() => {
                metrics::counter!(telemetry::FETCH_CANCELLED_TOTAL, "endpoint" => endpoint.clone())
                    .increment(1);
                debug!(endpoint = %endpoint, ?origin, "fetch cancelled");
            }
            Err(e) => {
                metrics::counter!(telemetry::FETCH_ERRORS_TOTAL, "endpoint" => endpoint.clone())
                    .increment(1);
                match origin {
                    Origin::Caller => warn!(endpoint = %endpoint, error = %e, "fetch failed"),
                    Origin::Background => {
                        metrics::counter!(
                            telemetry::BACKGROUND_REFRESH_FAILURES_TOTAL,
                            "endpoint" => endpoint.clone()
                        )
                        .increment(1);
                        warn!(
                            endpoint = %endpoint,
                            error = %e,
                            "background refresh failed, keeping stale entry"
                        );
                    }
                }
            }
        }
    }
}

/// Per-endpoint counts reported by [`ApiCacheManager::stats()`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EndpointStats {
    /// Stored entries, fresh or stale.
    pub cached: usize,
    /// Fetches currently outstanding.
    pub pending: usize,
}

/// Read-only snapshot of the manager's bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Every endpoint that is configured, cached, or pending, sorted.
    pub endpoints: Vec<String>,
    pub per_endpoint: BTreeMap<String, EndpointStats>,
}

/// Time-bounded cache and request deduplicator for asynchronous fetches.
///
/// Entries are keyed by `(endpoint, args)`. A fetch for a key either
/// returns a fresh entry, returns a stale entry while refreshing it in the
/// background, joins an identical in-flight fetch, or starts a new one.
///
/// Cheap to clone; clones share state. Create one at startup and tear it
/// down with [`clear_all()`](Self::clear_all) on sign-out or shutdown.
///
/// Fetches run as spawned tokio tasks, so every method that starts one
/// must be called from within a tokio runtime.
#[derive(Clone)]
pub struct ApiCacheManager {
    inner: Arc<Inner>,
}

impl ApiCacheManager {
    /// Create a manager with default capacity and default endpoint policy.
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Create a manager bounded to `max` stored entries.
    pub fn with_max_entries(max: u64) -> Self {
        Self::build(max, EndpointConfig::default())
    }

    /// Create a manager from loaded settings, registering every endpoint
    /// listed there.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        let manager = Self::build(settings.max_entries, settings.defaults.to_endpoint_config());
        for (endpoint, config) in settings.endpoint_configs() {
            manager.configure(&endpoint, config);
        }
        manager
    }

    fn build(max_entries: u64, default_config: EndpointConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: moka::sync::Cache::new(max_entries),
                pending: Mutex::new(Pending::default()),
                configs: RwLock::new(HashMap::new()),
                default_config,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Register the default policy for `endpoint`, replacing any previous one.
    pub fn configure(&self, endpoint: &str, config: EndpointConfig) {
        let previous = self
            .inner
            .configs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(endpoint.to_owned(), config);
        if previous.is_some() {
            info!(endpoint, ttl_ms = config.ttl.as_millis() as u64, "endpoint policy replaced");
        }
    }

    /// The policy that applies to `endpoint` when no override is given.
    pub fn config_for(&self, endpoint: &str) -> EndpointConfig {
        self.inner
            .configs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(endpoint)
            .copied()
            .unwrap_or(self.inner.default_config)
    }

    /// Fetch through the cache using the endpoint's registered policy.
    ///
    /// See [`fetch_with_config()`](Self::fetch_with_config).
    pub async fn fetch<T, A, F, Fut>(&self, endpoint: &str, args: A, fetch_fn: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        A: Serialize,
        F: FnOnce(A, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.fetch_with_config(endpoint, args, None, fetch_fn).await
    }

    /// Fetch through the cache, optionally overriding the endpoint policy.
    ///
    /// In priority order:
    ///
    /// 1. A fresh entry is returned without calling `fetch_fn`.
    /// 2. A stale entry is returned immediately when stale-while-revalidate
    ///    is on, and a background refresh is started unless one is already
    ///    in flight. Refresh failures are logged and dropped.
    /// 3. An identical in-flight fetch is joined when deduplication is on.
    /// 4. Otherwise `fetch_fn(args, token)` runs; success is stored with a
    ///    new expiry, failure is returned to every waiter and not stored.
    ///
    /// `fetch_fn` receives a [`CancellationToken`] that fires on
    /// [`cancel_pending()`](Self::cancel_pending) or
    /// [`clear_all()`](Self::clear_all); see [`cancellable()`]. It is called
    /// without any internal lock held, so it may use the manager itself.
    pub async fn fetch_with_config<T, A, F, Fut>(
        &self,
        endpoint: &str,
        args: A,
        override_config: Option<EndpointConfig>,
        fetch_fn: F,
    ) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        A: Serialize,
        F: FnOnce(A, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let config = override_config.unwrap_or_else(|| self.config_for(endpoint));
        let key = CacheKey::new(endpoint, &args)?;

        match self.begin(key, &config) {
            Lookup::Cached(payload) => downcast(endpoint, &payload),
            Lookup::Wait(waiting) => {
                drop((args, fetch_fn));
                downcast(endpoint, &waiting.await?)
            }
            Lookup::Refresh(payload, launch) => {
                // Detached: the refresh is observed only through the cache.
                self.launch(launch, |cancel| fetch_fn(args, cancel));
                downcast(endpoint, &payload)
            }
            Lookup::Fetch(waiting, launch) => {
                self.launch(launch, |cancel| fetch_fn(args, cancel));
                downcast(endpoint, &waiting.await?)
            }
        }
    }

    /// Decide how to serve `key`, registering a new fetch if needed.
    ///
    /// Runs entirely under the pending lock, so the lookup and any
    /// registration it makes are atomic. The fetch function itself is
    /// called later by [`launch()`](Self::launch), outside the lock.
    fn begin(&self, key: CacheKey, config: &EndpointConfig) -> Lookup {
        let endpoint = key.endpoint().to_owned();
        let mut pending = self.inner.lock_pending();
        let now = Instant::now();

        if let Some(entry) = self.inner.entries.get(&key) {
            if entry.is_fresh(now) {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "endpoint" => endpoint.clone())
                    .increment(1);
                debug!(endpoint = %endpoint, "cache hit");
                return Lookup::Cached(entry.payload);
            }
            if config.stale_while_revalidate {
                metrics::counter!(telemetry::CACHE_STALE_SERVED_TOTAL, "endpoint" => endpoint.clone())
                    .increment(1);
                let age_ms = now.duration_since(entry.created_at).as_millis() as u64;
                if pending.by_key.contains_key(&key) {
                    debug!(endpoint = %endpoint, age_ms, "serving stale entry, refresh in flight");
                    return Lookup::Cached(entry.payload);
                }
                debug!(endpoint = %endpoint, age_ms, "serving stale entry, refreshing");
                let (_, launch) =
                    self.register(&mut pending, key, config.ttl, true, Origin::Background);
                return Lookup::Refresh(entry.payload, launch);
            }
        }

        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "endpoint" => endpoint.clone())
            .increment(1);

        if config.deduplicate {
            if let Some(in_flight) = pending.by_key.get(&key) {
                metrics::counter!(telemetry::DEDUP_JOINS_TOTAL, "endpoint" => endpoint.clone())
                    .increment(1);
                debug!(endpoint = %endpoint, "joining in-flight request");
                return Lookup::Wait(in_flight.future.clone());
            }
        }

        debug!(endpoint = %endpoint, "cache miss, fetching");
        let (waiting, launch) = self.register(
            &mut pending,
            key,
            config.ttl,
            config.deduplicate,
            Origin::Caller,
        );
        Lookup::Fetch(waiting, launch)
    }

    /// Register a fetch that [`launch()`](Self::launch) will run.
    ///
    /// Waiters get the result through a channel filled once the fetch
    /// settles.
    fn register(
        &self,
        pending: &mut Pending,
        key: CacheKey,
        ttl: Duration,
        joinable: bool,
        origin: Origin,
    ) -> (SharedFetch, Launch) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (done, rx) = oneshot::channel();

        let future = async move {
            rx.await
                .unwrap_or_else(|_| Err(InsightError::Fetch("fetch task aborted".into())))
        }
        .boxed()
        .shared();

        pending.tokens.insert(
            generation,
            Registration {
                endpoint: key.endpoint().to_owned(),
                cancel: cancel.clone(),
            },
        );
        if joinable {
            pending.by_key.insert(
                key.clone(),
                InFlight {
                    future: future.clone(),
                    generation,
                },
            );
        }

        let launch = Launch {
            key,
            generation,
            ttl,
            origin,
            cancel,
            done,
        };
        (future, launch)
    }

    /// Call the fetch function for a registered fetch and spawn it.
    ///
    /// Must not be called with the pending lock held: `make` may call back
    /// into the manager.
    fn launch<T, Fut>(&self, launch: Launch, make: impl FnOnce(CancellationToken) -> Fut)
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let Launch {
            key,
            generation,
            ttl,
            origin,
            cancel,
            done,
        } = launch;

        let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| make(cancel))) {
            Ok(fut) => fut,
            Err(_) => {
                let result: Result<Payload> =
                    Err(InsightError::Fetch("fetch function panicked".into()));
                self.inner.settle(&key, generation, ttl, origin, &result);
                let _ = done.send(result);
                return;
            }
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = AssertUnwindSafe(fut)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(InsightError::Fetch("fetch function panicked".into())))
                .map(|value| Arc::new(value) as Payload);
            inner.settle(&key, generation, ttl, origin, &result);
            let _ = done.send(result);
        });
    }

    /// Remove the entry for `(endpoint, args)`. No-op if absent.
    pub fn invalidate<A: Serialize + ?Sized>(&self, endpoint: &str, args: &A) -> Result<()> {
        let key = CacheKey::new(endpoint, args)?;
        self.inner.entries.invalidate(&key);
        debug!(endpoint, "entry invalidated");
        Ok(())
    }

    /// Remove every entry stored under `endpoint`, whatever its args.
    pub fn invalidate_all(&self, endpoint: &str) {
        let keys: Vec<_> = self
            .inner
            .entries
            .iter()
            .filter(|(key, _)| key.endpoint() == endpoint)
            .map(|(key, _)| key)
            .collect();
        for key in &keys {
            self.inner.entries.invalidate(key.as_ref());
        }
        debug!(endpoint, removed = keys.len(), "endpoint invalidated");
    }

    /// Cancel every outstanding fetch under `endpoint` and forget them.
    ///
    /// Waiters already joined to a cancelled fetch receive whatever the
    /// fetch function settles with, typically [`InsightError::Cancelled`].
    pub fn cancel_pending(&self, endpoint: &str) {
        let mut pending = self.inner.lock_pending();
        let mut cancelled = 0usize;
        pending.tokens.retain(|_, registration| {
            if registration.endpoint == endpoint {
                registration.cancel.cancel();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        pending.by_key.retain(|key, _| key.endpoint() != endpoint);
        debug!(endpoint, cancelled, "pending requests cancelled");
    }

    /// Full reset: cancel every outstanding fetch and drop all entries.
    pub fn clear_all(&self) {
        let mut pending = self.inner.lock_pending();
        for registration in pending.tokens.values() {
            registration.cancel.cancel();
        }
        let cancelled = pending.tokens.len();
        pending.tokens.clear();
        pending.by_key.clear();
        self.inner.entries.invalidate_all();
        info!(cancelled, "request cache cleared");
    }

    /// Whether a joinable fetch for `(endpoint, args)` is in flight.
    pub fn is_pending<A: Serialize + ?Sized>(&self, endpoint: &str, args: &A) -> Result<bool> {
        let key = CacheKey::new(endpoint, args)?;
        Ok(self.inner.lock_pending().by_key.contains_key(&key))
    }

    /// Snapshot of endpoints with their cached and pending counts.
    pub fn stats(&self) -> CacheStats {
        self.inner.entries.run_pending_tasks();

        let mut per_endpoint: BTreeMap<String, EndpointStats> = self
            .inner
            .configs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .map(|endpoint| (endpoint.clone(), EndpointStats::default()))
            .collect();

        for (key, _) in self.inner.entries.iter() {
            per_endpoint
                .entry(key.endpoint().to_owned())
                .or_default()
                .cached += 1;
        }
        for registration in self.inner.lock_pending().tokens.values() {
            per_endpoint
                .entry(registration.endpoint.clone())
                .or_default()
                .pending += 1;
        }

        CacheStats {
            endpoints: per_endpoint.keys().cloned().collect(),
            per_endpoint,
        }
    }
}

impl Default for ApiCacheManager {
    fn default() -> Self {
        Self::new()
    }
}

fn downcast<T: Clone + 'static>(endpoint: &str, payload: &Payload) -> Result<T> {
    (**payload)
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| InsightError::TypeMismatch {
            endpoint: endpoint.to_owned(),
        })
}

/// Run `fut` until it settles or `token` is cancelled.
///
/// Cancellation resolves to [`InsightError::Cancelled`]. Convenience for
/// fetch functions that wrap a future with no cancellation support of its own.
pub async fn cancellable<T, Fut>(token: &CancellationToken, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = token.cancelled() => Err(InsightError::Cancelled),
        result = fut => result,
    }
}
