//! Sync watermark token

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::JradbError;

/// `chrono` format of a watermark token
pub const WATERMARK_FORMAT: &str = "%Y%m%d%H%M%S";

/// Watermark used on the very first run, before anything was persisted
pub const DEFAULT_WATERMARK: &str = "20240101000000";

/// Fixed-width `YYYYMMDDHHMMSS` timestamp marking the sync cursor.
///
/// The token is kept verbatim; ordering is plain string ordering, which is
/// chronological because every token has the same width.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Watermark(String);

impl Watermark {
    /// Parse and validate a token
    pub fn parse(token: &str) -> std::result::Result<Self, JradbError> {
        let token = token.trim();
        let well_formed = token.len() == 14
            && token.bytes().all(|b| b.is_ascii_digit())
            && NaiveDateTime::parse_from_str(token, WATERMARK_FORMAT).is_ok();

        if well_formed {
            Ok(Self(token.to_string()))
        } else {
            Err(JradbError::InvalidWatermark(token.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The later of `self` and `other`
    pub fn advance_to(self, other: &Watermark) -> Watermark {
        if *other > self {
            other.clone()
        } else {
            self
        }
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self(DEFAULT_WATERMARK.to_string())
    }
}

impl std::str::FromStr for Watermark {
    type Err = JradbError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Watermark {
    type Error = JradbError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Watermark> for String {
    fn from(value: Watermark) -> Self {
        value.0
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
