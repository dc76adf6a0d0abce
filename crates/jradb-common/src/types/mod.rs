//! Common types used across the sync agent

use serde::{Deserialize, Serialize};

pub mod category;
pub mod watermark;

pub use category::Category;
pub use watermark::Watermark;

/// Listing feed queried on every run.
///
/// Some categories can appear in either feed, so both are always checked,
/// accumulated first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedClass {
    /// Accumulated datasets (`data=store`)
    Accumulated,
    /// Bulletin / flash datasets (`data=flash`)
    Bulletin,
}

impl FeedClass {
    /// Feeds in the order a run issues them
    pub const ALL: [FeedClass; 2] = [FeedClass::Accumulated, FeedClass::Bulletin];

    /// Value of the provider's `data` query parameter
    pub fn wire_value(self) -> &'static str {
        match self {
            FeedClass::Accumulated => "store",
            FeedClass::Bulletin => "flash",
        }
    }
}

impl std::fmt::Display for FeedClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_value())
    }
}
