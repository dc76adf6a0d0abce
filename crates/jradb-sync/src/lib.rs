//! JRA-DB incremental sync agent
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Mirrors JRA-DB dataset archives into a cloud folder tree, one bounded
//! batch per invocation.
//!
//! # Pipeline
//!
//! - **Watermark**: `last_update.txt` under the storage root holds the
//!   `YYYYMMDDHHMMSS` cursor of the last successful run
//! - **Listing**: the provider is asked for files published since the
//!   watermark, for the `store` feed and then the `flash` feed
//! - **Fetch**: each allowed file is downloaded and unpacked (ZIP or LZH)
//! - **Publish**: unpacked files are upserted by name under
//!   `extracted/<CODE>/`
//!
//! # Example
//!
//! ```no_run
//! use jradb_sync::{config::SyncConfig, storage, sync::sync_once};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::load()?;
//!     let store = storage::connect(&config.storage, &config.http).await?;
//!
//!     let report = sync_once(&config, store).await?;
//!     println!("published {} files", report.files_published());
//!     Ok(())
//! }
//! ```

pub mod category;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod listing;
pub mod publish;
pub mod storage;
pub mod sync;
pub mod watermark;

pub use error::{Result, SyncError};
