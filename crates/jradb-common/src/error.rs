//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, JradbError>;

/// Main error type for the shared domain types
#[derive(Error, Debug)]
pub enum JradbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid watermark '{0}': expected a YYYYMMDDHHMMSS timestamp")]
    InvalidWatermark(String),

    #[error("Unknown dataset category: {0}")]
    UnknownCategory(String),
}
