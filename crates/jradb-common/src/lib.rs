//! JRA-DB Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the JRA-DB sync workspace.
//!
//! # Overview
//!
//! - **Types**: dataset categories, feed classes and the sync watermark
//! - **Error Handling**: the common error enum and result alias
//! - **Checksums**: SHA-256 digests for published files
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use jradb_common::types::{Category, Watermark};
//!
//! fn main() -> jradb_common::Result<()> {
//!     let since: Watermark = "20240101000000".parse()?;
//!     let category: Category = "JJOC".parse()?;
//!     println!("{} since {}", category, since);
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{JradbError, Result};
