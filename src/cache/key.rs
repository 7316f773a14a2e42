//! Cache key derivation.

use serde::Serialize;

use crate::Result;

/// Identity of a cached entry or in-flight request: `(endpoint, args)`.
///
/// `args` is the canonical JSON encoding of the argument value. Arguments
/// are first converted to a `serde_json::Value`, whose object maps are
/// ordered by key, so two maps with the same contents but different
/// insertion order produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    endpoint: String,
    args: String,
}

impl CacheKey {
    /// Derive the key for `endpoint` called with `args`.
    pub fn new<A: Serialize + ?Sized>(endpoint: &str, args: &A) -> Result<Self> {
        let value = serde_json::to_value(args)?;
        Ok(Self {
            endpoint: endpoint.to_owned(),
            args: serde_json::to_string(&value)?,
        })
    }

    /// The endpoint this key belongs to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The canonical argument signature.
    pub fn args(&self) -> &str {
        &self.args
    }
}
