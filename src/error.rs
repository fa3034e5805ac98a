//! Connector error types.
//!
//! Provides a unified error hierarchy for both connector sides:
//! - `ConnectorError`: Top-level error for source/destination operations
//! - `SerdeError`: Batch encoding errors

use thiserror::Error;

/// Errors that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The persisted position could not be parsed.
    #[error("invalid position: {0}")]
    InvalidPosition(String),

    /// The configured bucket does not exist or is not accessible.
    #[error("bucket {bucket} is not available: {message}")]
    BucketUnavailable {
        /// The bucket name.
        bucket: String,
        /// Details from the object store.
        message: String,
    },

    /// A bucket listing call failed.
    #[error("listing failed: {0}")]
    ListingFailed(String),

    /// An object body or header fetch failed.
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// Sentinel: there is currently nothing to emit; the host should
    /// reschedule the read. Not a failure condition.
    #[error("no records currently available, retry later")]
    BackoffRetry,

    /// The iterator was stopped explicitly.
    #[error("iterator stopped")]
    Stopped,

    /// Invalid connector configuration.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Required configuration key is missing.
    #[error("missing required config: {0}")]
    MissingConfig(String),

    /// Error uploading a batch object.
    #[error("write error: {0}")]
    WriteError(String),

    /// Batch encoding error.
    #[error("serde error: {0}")]
    Serde(#[from] SerdeError),

    /// An I/O error from the underlying system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error that doesn't fit other categories.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConnectorError {
    /// Returns `true` if this is the "no data right now" sentinel rather
    /// than a real failure.
    #[must_use]
    pub fn is_backoff_retry(&self) -> bool {
        matches!(self, ConnectorError::BackoffRetry)
    }
}

/// Errors that occur while encoding a batch of records.
#[derive(Debug, Error)]
pub enum SerdeError {
    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Parquet encoding error.
    #[error("Parquet error: {0}")]
    Parquet(String),

    /// The selected format has no encoder.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl From<serde_json::Error> for SerdeError {
    fn from(e: serde_json::Error) -> Self {
        SerdeError::Json(e.to_string())
    }
}
