//! Telemetry metric name constants.
//!
//! Centralised metric names for the request cache. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `insightkit_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `endpoint`: logical resource class passed to
//!   [`ApiCacheManager::fetch`](crate::cache::ApiCacheManager::fetch)

/// Fresh cache entries served without a fetch.
///
/// Labels: `endpoint`.
pub const CACHE_HITS_TOTAL: &str = "insightkit_cache_hits_total";

/// Lookups that found no servable entry.
///
/// Labels: `endpoint`.
pub const CACHE_MISSES_TOTAL: &str = "insightkit_cache_misses_total";

/// Stale entries served while a background refresh runs.
///
/// Labels: `endpoint`.
pub const CACHE_STALE_SERVED_TOTAL: &str = "insightkit_cache_stale_served_total";

/// Callers that joined an already in-flight request.
///
/// Labels: `endpoint`.
pub const DEDUP_JOINS_TOTAL: &str = "insightkit_dedup_joins_total";

/// Fetches that settled with an error (cancellations excluded).
///
/// Labels: `endpoint`.
pub const FETCH_ERRORS_TOTAL: &str = "insightkit_fetch_errors_total";

/// Fetches that settled as cancelled.
///
/// Labels: `endpoint`.
pub const FETCH_CANCELLED_TOTAL: &str = "insightkit_fetch_cancelled_total";

/// Background refreshes that failed and were discarded.
///
/// Labels: `endpoint`.
pub const BACKGROUND_REFRESH_FAILURES_TOTAL: &str =
    "insightkit_background_refresh_failures_total";
