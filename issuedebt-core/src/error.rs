//! Error types for issuedebt-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the issuedebt-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    ///
    /// Covers invalid config files as well as invalid analysis windows
    /// (start after end, allow-list and deny-list both set).
    #[error("configuration error: {0}")]
    Config(String),

    /// The on-disk cache exists but cannot be parsed
    #[error("cache unavailable at {}: {reason} (re-run with --flush)", path.display())]
    CacheUnavailable { path: PathBuf, reason: String },

    /// A single payload could not be normalized
    #[error(transparent)]
    MalformedRecord(#[from] MalformedRecord),

    /// GitHub API error
    #[error("fetch error: {0}")]
    Fetch(String),
}

/// A raw payload that could not be turned into an [`IssueRecord`](crate::types::IssueRecord).
///
/// Recoverable: ingestion skips the payload and keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed record{}: {reason}", id.map(|id| format!(" {}", id)).unwrap_or_default())]
pub struct MalformedRecord {
    /// Payload id, when one could be read
    pub id: Option<u64>,
    /// What was wrong with the payload
    pub reason: String,
}

impl MalformedRecord {
    pub fn new(id: Option<u64>, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }
}

/// Result type alias for issuedebt-core
pub type Result<T> = std::result::Result<T, Error>;
