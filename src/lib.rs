//! insightkit - client-side data plumbing for analytics dashboards
//!
//! Two independent parts:
//!
//! - [`cache`]: an async request cache with per-endpoint TTL,
//!   stale-while-revalidate, in-flight deduplication and cancellation.
//! - [`viz`]: pure transforms from query-result rows and a chart
//!   specification into chart-ready data, plus chart-type compatibility
//!   analysis.
//!
//! # Cache Example
//!
//! ```rust,no_run
//! use insightkit::{ApiCacheManager, CacheSettings};
//!
//! # async fn load_datasets(workspace: String) -> insightkit::Result<Vec<String>> { Ok(vec![]) }
//! #[tokio::main]
//! async fn main() -> insightkit::Result<()> {
//!     let settings = CacheSettings::load(None)?;
//!     let cache = ApiCacheManager::from_settings(&settings);
//!
//!     let datasets: Vec<String> = cache
//!         .fetch("datasets", "ws-1", |workspace, _cancel| {
//!             load_datasets(workspace.to_string())
//!         })
//!         .await?;
//!
//!     println!("{} datasets", datasets.len());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod viz;

// Re-export main types at crate root
pub use cache::{ApiCacheManager, CacheKey, CacheStats, EndpointConfig, EndpointStats, cancellable};
pub use config::CacheSettings;
pub use error::{InsightError, Result};
pub use viz::{ChartKind, ChartSpec, Encoding, FieldType, RawChartSpec, Row};
