//! Idempotent publisher
//!
//! Mirrors staged files to `<root>/extracted/<CODE>/<name>`. Folders and
//! files are always looked up by name, so publishing the same set twice
//! leaves exactly one object per name with the latest content.

use jradb_common::types::Category;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::fetch::StagedFile;
use crate::storage::{ensure_folder, upsert_file, Content, NodeId, RemoteStore};

/// Folder under the root holding one sub-folder per category
pub const EXTRACTED_FOLDER: &str = "extracted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFile {
    pub name: String,
    pub id: NodeId,
    pub size: u64,
    pub sha256: String,
    /// False when an existing object was overwritten
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub category: Category,
    pub published: Vec<PublishedFile>,
    pub failed: Vec<FailedFile>,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Publisher {
    store: Arc<dyn RemoteStore>,
}

impl Publisher {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Upsert every staged file into the category folder.
    ///
    /// Fails as a whole only if the folders cannot be resolved; individual
    /// file failures are collected in the report.
    #[instrument(skip(self, files), fields(category = %category, files = files.len()))]
    pub async fn publish(&self, category: Category, files: &[StagedFile]) -> Result<PublishReport> {
        let store = self.store.as_ref();
        let root = store.root();
        let extracted = ensure_folder(store, &root, EXTRACTED_FOLDER).await?;
        let folder = ensure_folder(store, &extracted.id, category.code()).await?;

        let mut report = PublishReport {
            category,
            published: Vec::new(),
            failed: Vec::new(),
        };

        for file in files {
            match self.publish_file(&folder.id, file).await {
                Ok(published) => {
                    info!(
                        file = %published.name,
                        bytes = published.size,
                        sha256 = %published.sha256,
                        action = if published.created { "created" } else { "updated" },
                        "Published file"
                    );
                    report.published.push(published);
                },
                Err(e) => {
                    warn!(file = %file.name, error = %e, "Failed to publish file");
                    report.failed.push(FailedFile {
                        name: file.name.clone(),
                        error: e.to_string(),
                    });
                },
            }
        }

        Ok(report)
    }

    async fn publish_file(&self, folder: &NodeId, file: &StagedFile) -> Result<PublishedFile> {
        let sha256 = checksum(file.path.clone()).await?;
        let upserted = upsert_file(
            self.store.as_ref(),
            folder,
            &file.name,
            &Content::LocalFile(file.path.clone()),
        )
        .await?;

        Ok(PublishedFile {
            name: file.name.clone(),
            id: upserted.node.id,
            size: file.size,
            sha256,
            created: upserted.created,
        })
    }
}

async fn checksum(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || jradb_common::checksum::sha256_file(&path))
        .await
        .map_err(|e| SyncError::Io(std::io::Error::other(e)))?
        .map_err(SyncError::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use crate::storage::NodeKind;
    use tempfile::TempDir;

    fn stage(dir: &TempDir, files: &[(&str, &[u8])]) -> Vec<StagedFile> {
        files
            .iter()
            .map(|(name, content)| {
                let path = dir.path().join(name);
                std::fs::write(&path, content).unwrap();
                StagedFile {
                    name: name.to_string(),
                    path,
                    size: content.len() as u64,
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_publish_creates_folder_layout() {
        let memory = Arc::new(MemoryStore::new());
        let publisher = Publisher::new(memory.clone());
        let dir = TempDir::new().unwrap();
        let files = stage(&dir, &[("jrsjoc.dat", b"jockeys")]);

        let report = publisher.publish(Category::Jjoc, &files).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.published.len(), 1);
        assert!(report.published[0].created);
        assert_eq!(
            report.published[0].sha256,
            jradb_common::checksum::sha256_file(&files[0].path).unwrap()
        );
        assert_eq!(
            memory.file_at(&["extracted", "JJOC", "jrsjoc.dat"]),
            Some(b"jockeys".to_vec())
        );
    }

    #[tokio::test]
    async fn test_publish_twice_is_idempotent() {
        let memory = Arc::new(MemoryStore::new());
        let publisher = Publisher::new(memory.clone());
        let dir = TempDir::new().unwrap();

        let first = stage(&dir, &[("a.dat", b"v1"), ("b.dat", b"b")]);
        publisher.publish(Category::Xhos, &first).await.unwrap();
        let second = stage(&dir, &[("a.dat", b"v2"), ("b.dat", b"b")]);
        let report = publisher.publish(Category::Xhos, &second).await.unwrap();

        assert!(report.published.iter().all(|f| !f.created));
        assert_eq!(memory.count_named("extracted", NodeKind::Folder), 1);
        assert_eq!(memory.count_named("XHOS", NodeKind::Folder), 1);
        assert_eq!(memory.count_named("a.dat", NodeKind::File), 1);
        assert_eq!(memory.file_at(&["extracted", "XHOS", "a.dat"]), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_one_failing_file_does_not_stop_siblings() {
        let memory = Arc::new(MemoryStore::new());
        memory.fail_writes_to("b.dat");
        let publisher = Publisher::new(memory.clone());
        let dir = TempDir::new().unwrap();
        let files = stage(&dir, &[("a.dat", b"a"), ("b.dat", b"b"), ("c.dat", b"c")]);

        let report = publisher.publish(Category::Xres, &files).await.unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "b.dat");
        assert_eq!(memory.files_in(&["extracted", "XRES"]), vec!["a.dat", "c.dat"]);
    }

    #[tokio::test]
    async fn test_folder_failure_fails_whole_publish() {
        let memory = Arc::new(MemoryStore::new());
        memory.fail_writes_to("extracted");
        let publisher = Publisher::new(memory.clone());
        let dir = TempDir::new().unwrap();
        let files = stage(&dir, &[("a.dat", b"a")]);

        let err = publisher.publish(Category::Xres, &files).await.unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(memory.stats().files_created, 0);
    }

    #[tokio::test]
    async fn test_empty_staged_set_still_resolves_folders() {
        let memory = Arc::new(MemoryStore::new());
        let publisher = Publisher::new(memory.clone());

        let report = publisher.publish(Category::Umas, &[]).await.unwrap();

        assert!(report.published.is_empty());
        assert_eq!(memory.count_named("UMAS", NodeKind::Folder), 1);
    }
}
