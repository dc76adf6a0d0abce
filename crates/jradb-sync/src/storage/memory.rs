//! In-process storage backend
//!
//! Keeps the whole tree in a map behind a mutex. Used by the unit and
//! integration tests; it also supports injecting failures on chosen names.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{Content, NodeId, NodeKind, RemoteNode, RemoteStore};
use crate::error::{Result, SyncError};

const ROOT_ID: &str = "root";

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    kind: NodeKind,
    parent: Option<String>,
    content: Vec<u8>,
}

/// Counters of mutating calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub folders_created: usize,
    pub files_created: usize,
    pub files_updated: usize,
}

impl MemoryStats {
    pub fn mutations(&self) -> usize {
        self.folders_created + self.files_created + self.files_updated
    }
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, Entry>,
    next_id: u64,
    stats: MemoryStats,
    failing: HashSet<String>,
    conflicting: HashSet<String>,
    deny_access: bool,
}

#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut state = State::default();
        state.entries.insert(
            ROOT_ID.to_string(),
            Entry {
                name: ROOT_ID.to_string(),
                kind: NodeKind::Folder,
                parent: None,
                content: Vec::new(),
            },
        );
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every create or update of `name` fail
    pub fn fail_writes_to(&self, name: &str) {
        self.lock().failing.insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// The next create of `name` stores the node but reports an error,
    /// as if a concurrent writer had won the race
    pub fn create_conflict_on(&self, name: &str) {
        self.lock().conflicting.insert(name.to_string());
    }

    /// Make `verify_root` fail with an authentication error
    pub fn deny_access(&self) {
        self.lock().deny_access = true;
    }

    pub fn stats(&self) -> MemoryStats {
        self.lock().stats
    }

    /// Number of nodes anywhere in the tree with this name and kind
    pub fn count_named(&self, name: &str, kind: NodeKind) -> usize {
        self.lock()
            .entries
            .values()
            .filter(|e| e.name == name && e.kind == kind)
            .count()
    }

    /// Content of the file at `path` below the root, e.g. `["extracted", "JJOC", "a.dat"]`
    pub fn file_at(&self, path: &[&str]) -> Option<Vec<u8>> {
        let state = self.lock();
        let (file_name, folders) = path.split_last()?;
        let parent = resolve(&state, folders)?;
        state
            .entries
            .values()
            .find(|e| {
                e.kind == NodeKind::File
                    && e.name == *file_name
                    && e.parent.as_deref() == Some(parent.as_str())
            })
            .map(|e| e.content.clone())
    }

    /// Sorted names of the files directly inside the folder at `path`
    pub fn files_in(&self, path: &[&str]) -> Vec<String> {
        let state = self.lock();
        let Some(folder) = resolve(&state, path) else {
            return Vec::new();
        };
        let mut names: Vec<String> = state
            .entries
            .values()
            .filter(|e| e.kind == NodeKind::File && e.parent.as_deref() == Some(folder.as_str()))
            .map(|e| e.name.clone())
            .collect();
        names.sort();
        names
    }

    fn insert(
        &self,
        parent: &NodeId,
        name: &str,
        kind: NodeKind,
        content: Vec<u8>,
    ) -> Result<RemoteNode> {
        let mut state = self.lock();
        if !state.entries.contains_key(parent.as_str()) {
            return Err(SyncError::Storage(format!("parent {parent} not found")));
        }
        if state.failing.contains(name) {
            return Err(SyncError::Storage(format!("injected failure creating {name}")));
        }

        state.next_id += 1;
        let id = format!("node-{}", state.next_id);
        state.entries.insert(
            id.clone(),
            Entry {
                name: name.to_string(),
                kind,
                parent: Some(parent.as_str().to_string()),
                content,
            },
        );
        match kind {
            NodeKind::Folder => state.stats.folders_created += 1,
            NodeKind::File => state.stats.files_created += 1,
        }

        if state.conflicting.remove(name) {
            return Err(SyncError::Storage(format!("conflict creating {name}")));
        }

        Ok(RemoteNode {
            id: NodeId::new(id),
            name: name.to_string(),
            kind,
        })
    }
}

fn resolve(state: &State, path: &[&str]) -> Option<String> {
    let mut current = ROOT_ID.to_string();
    for segment in path {
        let (id, _) = state.entries.iter().find(|(_, e)| {
            e.kind == NodeKind::Folder
                && e.name == *segment
                && e.parent.as_deref() == Some(current.as_str())
        })?;
        current = id.clone();
    }
    Some(current)
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn root(&self) -> NodeId {
        NodeId::new(ROOT_ID)
    }

    async fn verify_root(&self) -> Result<()> {
        if self.lock().deny_access {
            return Err(SyncError::StorageAuth("access denied to root".to_string()));
        }
        Ok(())
    }

    async fn find_children(
        &self,
        parent: &NodeId,
        name: &str,
        kind: NodeKind,
    ) -> Result<Vec<RemoteNode>> {
        let state = self.lock();
        // Map order is lexicographic; creation order is the numeric suffix
        let mut found: Vec<(u64, RemoteNode)> = state
            .entries
            .iter()
            .filter(|(_, e)| {
                e.kind == kind && e.name == name && e.parent.as_deref() == Some(parent.as_str())
            })
            .map(|(id, e)| {
                let seq = id.trim_start_matches("node-").parse().unwrap_or(0);
                (
                    seq,
                    RemoteNode {
                        id: NodeId::new(id.clone()),
                        name: e.name.clone(),
                        kind: e.kind,
                    },
                )
            })
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        Ok(found.into_iter().map(|(_, node)| node).collect())
    }

    async fn create_folder(&self, parent: &NodeId, name: &str) -> Result<RemoteNode> {
        self.insert(parent, name, NodeKind::Folder, Vec::new())
    }

    async fn create_file(
        &self,
        parent: &NodeId,
        name: &str,
        content: &Content,
    ) -> Result<RemoteNode> {
        let bytes = content.to_bytes().await?;
        self.insert(parent, name, NodeKind::File, bytes)
    }

    async fn update_file(&self, file: &NodeId, content: &Content) -> Result<()> {
        let bytes = content.to_bytes().await?;
        let mut state = self.lock();
        let State {
            entries,
            failing,
            stats,
            ..
        } = &mut *state;

        let entry = entries
            .get_mut(file.as_str())
            .filter(|e| e.kind == NodeKind::File)
            .ok_or_else(|| SyncError::Storage(format!("file {file} not found")))?;
        if failing.contains(&entry.name) {
            return Err(SyncError::Storage(format!("injected failure updating {}", entry.name)));
        }

        entry.content = bytes;
        stats.files_updated += 1;
        Ok(())
    }

    async fn read_text(&self, file: &NodeId) -> Result<String> {
        let state = self.lock();
        let entry = state
            .entries
            .get(file.as_str())
            .filter(|e| e.kind == NodeKind::File)
            .ok_or_else(|| SyncError::Storage(format!("file {file} not found")))?;
        Ok(String::from_utf8_lossy(&entry.content).into_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_path_helpers() {
        let store = MemoryStore::new();
        let root = store.root();
        let extracted = store.create_folder(&root, "extracted").await.unwrap();
        let jjoc = store.create_folder(&extracted.id, "JJOC").await.unwrap();
        store
            .create_file(&jjoc.id, "b.dat", &Content::Text("b".into()))
            .await
            .unwrap();
        store
            .create_file(&jjoc.id, "a.dat", &Content::Text("a".into()))
            .await
            .unwrap();

        assert_eq!(store.files_in(&["extracted", "JJOC"]), vec!["a.dat", "b.dat"]);
        assert_eq!(store.file_at(&["extracted", "JJOC", "a.dat"]), Some(b"a".to_vec()));
        assert_eq!(store.file_at(&["extracted", "XHOS", "a.dat"]), None);
        assert_eq!(store.stats().folders_created, 2);
        assert_eq!(store.stats().files_created, 2);
    }

    #[tokio::test]
    async fn test_create_under_missing_parent_fails() {
        let store = MemoryStore::new();
        let err = store
            .create_folder(&NodeId::new("nope"), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
    }

    #[tokio::test]
    async fn test_deny_access() {
        let store = MemoryStore::new();
        store.verify_root().await.unwrap();
        store.deny_access();
        assert!(store.verify_root().await.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_update_failure_leaves_content() {
        let store = MemoryStore::new();
        let root = store.root();
        let file = store
            .create_file(&root, "keep.txt", &Content::Text("old".into()))
            .await
            .unwrap();
        store.fail_writes_to("keep.txt");

        assert!(store
            .update_file(&file.id, &Content::Text("new".into()))
            .await
            .is_err());
        assert_eq!(store.read_text(&file.id).await.unwrap(), "old");

        store.clear_failures();
        store
            .update_file(&file.id, &Content::Text("new".into()))
            .await
            .unwrap();
        assert_eq!(store.read_text(&file.id).await.unwrap(), "new");
    }
}
