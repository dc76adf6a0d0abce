//! Category registry
//!
//! The allow-list of categories a run mirrors. Built once from configuration
//! and shared read-only by the listing client and the pipeline.

use jradb_common::types::Category;
use std::collections::BTreeSet;

use crate::error::{Result, SyncError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRegistry {
    enabled: BTreeSet<Category>,
}

impl CategoryRegistry {
    pub fn new(enabled: impl IntoIterator<Item = Category>) -> Self {
        Self {
            enabled: enabled.into_iter().collect(),
        }
    }

    /// Parse a comma-separated list of codes, e.g. `"XHOS, JJOC"`.
    ///
    /// Any unknown code fails the whole list: a typo in configuration
    /// should stop the run rather than silently drop a dataset.
    pub fn from_codes(list: &str) -> Result<Self> {
        let mut enabled = BTreeSet::new();
        for code in list.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let category = code
                .parse::<Category>()
                .map_err(|e| SyncError::Config(e.to_string()))?;
            enabled.insert(category);
        }

        if enabled.is_empty() {
            return Err(SyncError::Config("category allow-list is empty".to_string()));
        }

        Ok(Self { enabled })
    }

    /// Resolve a provider code against the allow-list.
    ///
    /// Returns `None` both for unknown codes and for known but disabled
    /// ones; neither is an error.
    pub fn lookup(&self, code: &str) -> Option<Category> {
        Category::from_code(code.trim()).filter(|c| self.enabled.contains(c))
    }

    pub fn iter(&self) -> impl Iterator<Item = Category> + '_ {
        self.enabled.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::new(Category::DEFAULT_ENABLED)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = CategoryRegistry::default();
        assert_eq!(registry.len(), 14);
        assert_eq!(registry.lookup("JJOC"), Some(Category::Jjoc));
        assert_eq!(registry.lookup("XSIN"), Some(Category::Xsin));
    }

    #[test]
    fn test_lookup_drops_unknown_and_disabled_codes() {
        let registry = CategoryRegistry::default();
        assert_eq!(registry.lookup("ZZZZ"), None);
        assert_eq!(registry.lookup("X200"), None);
    }

    #[test]
    fn test_from_codes() {
        let registry = CategoryRegistry::from_codes("xhos, JJOC,,X200").unwrap();
        assert_eq!(
            registry.iter().collect::<Vec<_>>(),
            vec![Category::Xhos, Category::Jjoc, Category::X200]
        );
        assert_eq!(registry.lookup("X200"), Some(Category::X200));
        assert_eq!(registry.lookup("XRES"), None);
    }

    #[test]
    fn test_from_codes_rejects_unknown_code() {
        let err = CategoryRegistry::from_codes("XHOS,XHSO").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("XHSO"));
    }

    #[test]
    fn test_from_codes_rejects_empty_list() {
        assert!(CategoryRegistry::from_codes(" , ").is_err());
    }
}
