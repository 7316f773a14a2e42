//! insightkit error types

use crate::viz::Channel;

/// insightkit error types
///
/// `Clone` so that a single settled in-flight fetch can hand the same
/// outcome to every waiter on its key.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InsightError {
    // Fetch errors (reported by caller-supplied fetch functions)
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The request was deliberately aborted via its cancellation token.
    #[error("request cancelled")]
    Cancelled,

    // Data errors
    #[error("JSON error: {0}")]
    Json(String),

    /// A cached value was requested as a different type than it was stored with.
    #[error("cached value for endpoint '{endpoint}' has an unexpected type")]
    TypeMismatch { endpoint: String },

    // Chart configuration errors
    #[error("chart specification is missing the '{0}' encoding")]
    MissingEncoding(Channel),

    #[error("no numeric field found to use as the y axis")]
    NoNumericField,

    #[error("dataset is empty")]
    EmptyData,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl InsightError {
    /// Whether this error signals a deliberate abort rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, InsightError::Cancelled)
    }

    /// Whether this is a chart/configuration error that callers should
    /// answer with a fallback rendering instead of a retry.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            InsightError::MissingEncoding(_)
                | InsightError::NoNumericField
                | InsightError::EmptyData
                | InsightError::Configuration(_)
        )
    }
}

impl From<serde_json::Error> for InsightError {
    fn from(err: serde_json::Error) -> Self {
        InsightError::Json(err.to_string())
    }
}

/// Result type alias for insightkit operations
pub type Result<T> = std::result::Result<T, InsightError>;
