//! Persisted sync cursor
//!
//! The watermark lives in a single small text object, `last_update.txt`,
//! directly under the storage root.

use jradb_common::types::Watermark;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::storage::{find_one, upsert_file, Content, NodeKind, RemoteStore};

pub const WATERMARK_FILE: &str = "last_update.txt";

/// What [`WatermarkStore::write`] ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The stored value already equals the token
    Unchanged,
    /// The stored value is later than the token and was kept
    Kept { stored: Watermark },
}

pub struct WatermarkStore {
    store: Arc<dyn RemoteStore>,
    default: Watermark,
}

impl WatermarkStore {
    pub fn new(store: Arc<dyn RemoteStore>, default: Watermark) -> Self {
        Self { store, default }
    }

    /// Stored watermark, or the default.
    ///
    /// Never fails: a missing, unreadable or invalid object falls back to the
    /// default so the run can still fetch something.
    #[instrument(skip(self))]
    pub async fn read(&self) -> Watermark {
        match self.stored().await {
            Ok(Some(watermark)) => watermark,
            Ok(None) => {
                info!(default = %self.default, "No stored watermark, using default");
                self.default.clone()
            },
            Err(e) => {
                warn!(error = %e, default = %self.default, "Failed to read watermark, using default");
                self.default.clone()
            },
        }
    }

    /// Persist `token`, never moving the stored value backwards
    #[instrument(skip(self), fields(token = %token))]
    pub async fn write(&self, token: &Watermark) -> Result<WriteOutcome> {
        match self.stored().await? {
            Some(stored) if stored > *token => {
                warn!(stored = %stored, "Stored watermark is later, not moving it backwards");
                return Ok(WriteOutcome::Kept { stored });
            },
            Some(stored) if stored == *token => return Ok(WriteOutcome::Unchanged),
            _ => {},
        }

        let root = self.store.root();
        upsert_file(
            self.store.as_ref(),
            &root,
            WATERMARK_FILE,
            &Content::Text(token.to_string()),
        )
        .await?;

        info!("Watermark updated");
        Ok(WriteOutcome::Written)
    }

    /// Current stored value; `None` when absent or not a valid token
    async fn stored(&self) -> Result<Option<Watermark>> {
        let root = self.store.root();
        let Some(file) = find_one(self.store.as_ref(), &root, WATERMARK_FILE, NodeKind::File).await?
        else {
            return Ok(None);
        };

        let text = self.store.read_text(&file.id).await?;
        match Watermark::parse(&text) {
            Ok(watermark) => Ok(Some(watermark)),
            Err(e) => {
                warn!(error = %e, "Stored watermark is not a valid token, ignoring it");
                Ok(None)
            },
        }
    }
}
