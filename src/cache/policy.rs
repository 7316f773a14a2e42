//! Per-endpoint caching policy.

use std::time::Duration;

/// Caching policy for one endpoint.
///
/// Registered once via [`ApiCacheManager::configure()`](super::ApiCacheManager::configure)
/// and optionally overridden per call.
///
/// ```rust
/// # use insightkit::EndpointConfig;
/// # use std::time::Duration;
/// let config = EndpointConfig::new()
///     .ttl(Duration::from_secs(30))
///     .stale_while_revalidate(false);
/// assert!(config.deduplicate);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    /// How long a stored entry stays fresh. Default: 5 minutes.
    pub ttl: Duration,
    /// Serve an expired entry immediately and refresh it in the background.
    /// Default: true.
    pub stale_while_revalidate: bool,
    /// Collapse concurrent identical requests into one fetch. Default: true.
    pub deduplicate: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            stale_while_revalidate: true,
            deduplicate: true,
        }
    }
}

impl EndpointConfig {
    /// Create a policy with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time-to-live for stored entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable stale-while-revalidate.
    pub fn stale_while_revalidate(mut self, enabled: bool) -> Self {
        self.stale_while_revalidate = enabled;
        self
    }

    /// Enable or disable in-flight deduplication.
    pub fn deduplicate(mut self, enabled: bool) -> Self {
        self.deduplicate = enabled;
        self
    }
}
