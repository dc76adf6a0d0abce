//! Remote storage
//!
//! The publisher and the watermark store only ever need a handful of
//! operations on a folder tree: look a child up by name, create a folder,
//! create a file, replace a file's content and read a small text file. Those
//! live behind [`RemoteStore`]; the by-name upsert logic built on top of them
//! is shared by every backend.
//!
//! # Backends
//!
//! - [`drive::DriveStore`]: Google Drive v3 (folders and files addressed by id)
//! - [`s3::S3Store`]: S3-compatible buckets (folders are key prefixes)
//! - `memory::MemoryStore`: in-process tree used by the test suites
//!   (`test-util` feature)
//!
//! # Concurrency
//!
//! Lookups and creates are separate calls, so two agents running against the
//! same root at the same time can still create duplicate folders or lose an
//! update. A failed create is re-checked once, which narrows the window but
//! does not close it. Runs are expected to be serialized by the scheduler.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::HttpConfig;
use crate::error::{Result, SyncError};

pub mod config;
pub mod drive;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod s3;

/// Backend-specific identifier of a folder or file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Folder,
    File,
}

/// A folder or file as seen in the remote tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
}

/// Content to store in a remote file
#[derive(Debug, Clone)]
pub enum Content {
    /// Stream the bytes of a local file
    LocalFile(PathBuf),
    /// A short UTF-8 string
    Text(String),
}

impl Content {
    pub async fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Content::LocalFile(path) => Ok(tokio::fs::read(path).await?),
            Content::Text(text) => Ok(text.as_bytes().to_vec()),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Content::LocalFile(_) => "application/octet-stream",
            Content::Text(_) => "text/plain",
        }
    }
}

/// Folder/file operations the sync engine needs from a storage backend
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// The configured root folder
    fn root(&self) -> NodeId;

    /// Check credentials and that the root folder is reachable
    async fn verify_root(&self) -> Result<()>;

    /// Children of `parent` with exactly this name and kind
    async fn find_children(
        &self,
        parent: &NodeId,
        name: &str,
        kind: NodeKind,
    ) -> Result<Vec<RemoteNode>>;

    async fn create_folder(&self, parent: &NodeId, name: &str) -> Result<RemoteNode>;

    async fn create_file(&self, parent: &NodeId, name: &str, content: &Content)
        -> Result<RemoteNode>;

    /// Replace the content of an existing file in place
    async fn update_file(&self, file: &NodeId, content: &Content) -> Result<()>;

    async fn read_text(&self, file: &NodeId) -> Result<String>;
}

/// Build the backend selected by configuration
pub async fn connect(
    config: &config::StorageConfig,
    http: &HttpConfig,
) -> Result<Arc<dyn RemoteStore>> {
    let store: Arc<dyn RemoteStore> = match config {
        config::StorageConfig::Drive(drive) => {
            Arc::new(drive::DriveStore::new(drive.clone(), http)?)
        },
        config::StorageConfig::S3(s3) => Arc::new(s3::S3Store::new(s3.clone()).await?),
    };

    info!(backend = store.backend(), root = %store.root(), "Storage client initialized");
    Ok(store)
}

/// Look up a single child by name.
///
/// Duplicates can only appear after a concurrent run raced us; the first
/// match wins, as on every previous run.
pub async fn find_one(
    store: &dyn RemoteStore,
    parent: &NodeId,
    name: &str,
    kind: NodeKind,
) -> Result<Option<RemoteNode>> {
    let mut matches = store.find_children(parent, name, kind).await?;
    if matches.len() > 1 {
        warn!(
            parent = %parent,
            name,
            count = matches.len(),
            "Duplicate remote objects with the same name, using the first"
        );
    }
    Ok(if matches.is_empty() {
        None
    } else {
        Some(matches.swap_remove(0))
    })
}

/// Resolve a folder by name, creating it when absent
pub async fn ensure_folder(
    store: &dyn RemoteStore,
    parent: &NodeId,
    name: &str,
) -> Result<RemoteNode> {
    if let Some(folder) = find_one(store, parent, name, NodeKind::Folder).await? {
        debug!(name, id = %folder.id, "Folder exists");
        return Ok(folder);
    }

    match store.create_folder(parent, name).await {
        Ok(folder) => {
            info!(name, id = %folder.id, "Created folder");
            Ok(folder)
        },
        Err(create_err) => {
            // Someone else may have created it between our lookup and create
            match find_one(store, parent, name, NodeKind::Folder).await {
                Ok(Some(folder)) => {
                    warn!(name, error = %create_err, "Folder create failed but folder now exists");
                    Ok(folder)
                },
                _ => Err(create_err),
            }
        },
    }
}

/// Result of a by-name upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub node: RemoteNode,
    pub created: bool,
}

/// Overwrite the file named `name` under `parent`, or create it
pub async fn upsert_file(
    store: &dyn RemoteStore,
    parent: &NodeId,
    name: &str,
    content: &Content,
) -> Result<Upserted> {
    if let Some(existing) = find_one(store, parent, name, NodeKind::File).await? {
        store.update_file(&existing.id, content).await?;
        return Ok(Upserted {
            node: existing,
            created: false,
        });
    }

    match store.create_file(parent, name, content).await {
        Ok(node) => Ok(Upserted {
            node,
            created: true,
        }),
        Err(create_err) => match find_one(store, parent, name, NodeKind::File).await {
            Ok(Some(existing)) => {
                warn!(name, error = %create_err, "File create failed but file now exists, updating it");
                store.update_file(&existing.id, content).await?;
                Ok(Upserted {
                    node: existing,
                    created: false,
                })
            },
            _ => Err(create_err),
        },
    }
}

/// Escape a name for use inside a single-quoted query literal
pub(crate) fn quote_literal(name: &str) -> String {
    name.replace('\\', "\\\\").replace('\'', "\\'")
}

pub(crate) fn status_error(context: &str, status: reqwest::StatusCode, body: &str) -> SyncError {
    let snippet: String = body.chars().take(200).collect();
    SyncError::Storage(format!("{context}: HTTP {status}: {snippet}"))
}
