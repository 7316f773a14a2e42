//! Client-side request cache.
//!
//! [`ApiCacheManager`] sits between data-fetching call sites and the remote
//! API. Call sites name a logical endpoint (e.g. `"workspaces"`,
//! `"datasets"`, `"messages"`), pass the arguments that identify the
//! resource, and supply the function that performs the actual request.
//! The manager decides whether that function runs at all.
//!
//! # Semantics
//!
//! - **TTL**: an entry is fresh until `stored_at + ttl`, stale afterwards.
//!   Stale entries are kept until replaced, invalidated, or evicted by the
//!   capacity bound.
//! - **Stale-while-revalidate**: a stale entry is served immediately and
//!   refreshed by a detached task. Refresh failures are logged, never
//!   returned.
//! - **Deduplication**: at most one joinable fetch per `(endpoint, args)`
//!   is in flight; concurrent callers share its outcome, success or error.
//! - **Cancellation**: every fetch function receives a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken) that fires
//!   on [`ApiCacheManager::cancel_pending()`] and
//!   [`ApiCacheManager::clear_all()`].
//!
//! # Concurrency
//!
//! The in-flight map is guarded by a mutex and every lookup-then-register
//! step runs under it, so the one-fetch-per-key guarantee holds on a
//! multi-threaded runtime. Stored entries live in a bounded
//! [moka](https://docs.rs/moka) cache; freshness is computed from the
//! entry's own timestamps on the tokio clock, so expired entries remain
//! servable as stale.
//!
//! ```rust,no_run
//! use insightkit::{ApiCacheManager, EndpointConfig, Result};
//! use std::time::Duration;
//!
//! # async fn list_workspaces(token: String) -> Result<Vec<String>> { Ok(vec![]) }
//! # async fn example() -> Result<()> {
//! let cache = ApiCacheManager::new();
//! cache.configure("workspaces", EndpointConfig::new().ttl(Duration::from_secs(60)));
//!
//! let workspaces: Vec<String> = cache
//!     .fetch("workspaces", ("bearer-token",), |(token,), _cancel| {
//!         list_workspaces(token.to_string())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod key;
pub mod manager;
pub mod policy;

pub use key::CacheKey;
pub use manager::{ApiCacheManager, CacheStats, DEFAULT_MAX_ENTRIES, EndpointStats, cancellable};
pub use policy::EndpointConfig;
