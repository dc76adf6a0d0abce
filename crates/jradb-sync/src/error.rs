//! Error types for the sync agent
//!
//! Variants line up with how far a failure is allowed to travel:
//!
//! - `Config`, `StorageAuth`: fatal, the run aborts before any side effect
//! - `Listing`: one feed is treated as empty, the other proceeds
//! - `Download`, `Extraction`: one candidate is skipped
//! - `Storage`: one remote operation failed (one file, or one candidate when
//!   folder resolution fails)

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage authentication failed: {0}")]
    StorageAuth(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("Listing error: {0}")]
    Listing(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] jradb_common::JradbError),
}

impl SyncError {
    /// Whether the whole run must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Config(_) | SyncError::StorageAuth(_))
    }

    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        SyncError::Storage(format!("{context}: {err}"))
    }
}
