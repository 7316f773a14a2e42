//! Configuration loading for the request cache.
//!
//! Settings are loaded from a TOML file with the following resolution order:
//! 1. explicit path (must exist)
//! 2. `~/.insightkit/config.toml` (user)
//! 3. built-in defaults
//!
//! ```toml
//! max_entries = 10000
//!
//! [defaults]
//! ttl_secs = 300
//!
//! [endpoints.messages]
//! ttl_secs = 10
//! stale_while_revalidate = false
//! ```
//!
//! Keys missing from an `[endpoints.*]` section are taken from `[defaults]`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::cache::{DEFAULT_MAX_ENTRIES, EndpointConfig};
use crate::{InsightError, Result};

/// Request cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Upper bound on stored entries (default: 10,000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Policy for endpoints without their own section.
    #[serde(default)]
    pub defaults: PolicySettings,
    /// Per-endpoint overrides, keyed by endpoint name.
    #[serde(default)]
    pub endpoints: BTreeMap<String, PartialPolicySettings>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            defaults: PolicySettings::default(),
            endpoints: BTreeMap::new(),
        }
    }
}

fn default_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

/// A complete endpoint policy.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySettings {
    /// Time-to-live in seconds (default: 300).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_true")]
    pub stale_while_revalidate: bool,
    #[serde(default = "default_true")]
    pub deduplicate: bool,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            stale_while_revalidate: true,
            deduplicate: true,
        }
    }
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl PolicySettings {
    pub fn to_endpoint_config(&self) -> EndpointConfig {
        EndpointConfig::new()
            .ttl(Duration::from_secs(self.ttl_secs))
            .stale_while_revalidate(self.stale_while_revalidate)
            .deduplicate(self.deduplicate)
    }
}

/// An endpoint section; unset keys inherit from `[defaults]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialPolicySettings {
    pub ttl_secs: Option<u64>,
    pub stale_while_revalidate: Option<bool>,
    pub deduplicate: Option<bool>,
}

impl PartialPolicySettings {
    fn resolve(&self, defaults: &PolicySettings) -> EndpointConfig {
        PolicySettings {
            ttl_secs: self.ttl_secs.unwrap_or(defaults.ttl_secs),
            stale_while_revalidate: self
                .stale_while_revalidate
                .unwrap_or(defaults.stale_while_revalidate),
            deduplicate: self.deduplicate.unwrap_or(defaults.deduplicate),
        }
        .to_endpoint_config()
    }
}

impl CacheSettings {
    /// Load settings from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; missing file is an error)
    /// 2. `~/.insightkit/config.toml`
    /// 3. Built-in defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => {
                debug!("no cache config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse settings from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            InsightError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            InsightError::Configuration(msg) => {
                InsightError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse settings from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            InsightError::Configuration(format!("Failed to parse cache config: {e}"))
        })
    }

    fn resolve_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(InsightError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        Ok(dirs::home_dir()
            .map(|home| home.join(".insightkit").join("config.toml"))
            .filter(|path| path.exists()))
    }

    /// Resolved policy for every endpoint listed in the file.
    pub fn endpoint_configs(&self) -> Vec<(String, EndpointConfig)> {
        self.endpoints
            .iter()
            .map(|(name, partial)| (name.clone(), partial.resolve(&self.defaults)))
            .collect()
    }
}
