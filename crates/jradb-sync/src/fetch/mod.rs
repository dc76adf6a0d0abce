//! Fetch-extract pipeline
//!
//! Turns a [`DownloadCandidate`] into a set of local files ready to publish:
//! the archive is downloaded into the run directory, dispatched on its suffix
//! and decompressed into a per-category directory.
//!
//! ```text
//! <run_dir>/
//! ├── downloads/<filename>
//! └── extracted/<CODE>/[<dir>/]<member>...
//! ```
//!
//! Every candidate gets a [`CandidateWorkspace`] that owns its download path
//! and extraction directory and removes both when done.

pub mod decompression;
pub mod download;
#[cfg(any(test, feature = "test-util"))]
pub mod fixtures;

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::http::ProviderClient;
use crate::listing::{url_filename, DownloadCandidate};

/// Archive formats the pipeline can unpack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Lzh,
}

impl ArchiveFormat {
    /// Classify by suffix, ignoring ASCII case
    pub fn from_filename(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if lower.ends_with(".lzh") {
            Some(ArchiveFormat::Lzh)
        } else {
            None
        }
    }
}

/// A decompressed file waiting to be published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Remote object name (lossy UTF-8 of the local name)
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Staged(Vec<StagedFile>),
    /// Suffix is neither `.zip` nor `.lzh`; nothing was downloaded
    Unrecognized { filename: String },
}

/// Self-deleting working directory for one run
#[derive(Debug)]
pub struct RunDirectory {
    dir: TempDir,
}

impl RunDirectory {
    /// Create a fresh directory under `work_root`
    pub fn create(work_root: &Path) -> Result<Self> {
        std::fs::create_dir_all(work_root)?;
        let dir = tempfile::Builder::new()
            .prefix("jradb-sync-")
            .tempdir_in(work_root)?;
        std::fs::create_dir_all(dir.path().join("downloads"))?;
        std::fs::create_dir_all(dir.path().join("extracted"))?;

        debug!(path = %dir.path().display(), "Created run directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the directory now, reporting any failure
    pub fn close(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }
}

/// Scoped local state of one candidate
#[derive(Debug)]
pub struct CandidateWorkspace {
    filename: String,
    download_path: PathBuf,
    extract_dir: PathBuf,
    cleaned: bool,
}

impl CandidateWorkspace {
    /// Reserve paths for `candidate` inside `run`.
    ///
    /// Fails when the URL has no usable file name.
    pub fn new(run: &RunDirectory, candidate: &DownloadCandidate) -> Result<Self> {
        let filename = url_filename(&candidate.url)
            .filter(|name| name != "." && name != ".." && !name.contains(['/', '\\']))
            .ok_or_else(|| {
                SyncError::Download(format!("no usable file name in URL {}", candidate.url))
            })?;

        Ok(Self {
            download_path: run.path().join("downloads").join(&filename),
            extract_dir: run
                .path()
                .join("extracted")
                .join(candidate.category.code()),
            filename,
            cleaned: false,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn download_path(&self) -> &Path {
        &self.download_path
    }

    pub fn extract_dir(&self) -> &Path {
        &self.extract_dir
    }

    /// Remove the download and the extraction directory
    pub fn cleanup(&mut self) -> Result<()> {
        self.cleaned = true;
        remove_file_if_exists(&self.download_path)?;
        remove_dir_if_exists(&self.extract_dir)?;
        Ok(())
    }
}

impl Drop for CandidateWorkspace {
    fn drop(&mut self) {
        if !self.cleaned {
            if let Err(e) = self.cleanup() {
                warn!(file = %self.filename, error = %e, "Failed to clean candidate workspace");
            }
        }
    }
}

fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

pub struct FetchPipeline {
    http: ProviderClient,
}

impl FetchPipeline {
    pub fn new(http: ProviderClient) -> Self {
        Self { http }
    }

    /// Download and unpack one candidate into its workspace
    #[instrument(skip_all, fields(category = %candidate.category, url = %candidate.url))]
    pub async fn process(
        &self,
        candidate: &DownloadCandidate,
        workspace: &CandidateWorkspace,
    ) -> Result<FetchOutcome> {
        let Some(format) = ArchiveFormat::from_filename(workspace.filename()) else {
            warn!(filename = %workspace.filename(), "Unrecognized archive format, skipping");
            return Ok(FetchOutcome::Unrecognized {
                filename: workspace.filename().to_string(),
            });
        };

        let size = download::download_to(&self.http, &candidate.url, workspace.download_path())
            .await?;

        // A leftover directory from an earlier attempt would leak stale members
        remove_dir_if_exists(workspace.extract_dir())?;
        std::fs::create_dir_all(workspace.extract_dir())?;

        let archive = workspace.download_path().to_path_buf();
        let dest = workspace.extract_dir().to_path_buf();
        let staged =
            tokio::task::spawn_blocking(move || decompression::extract(format, &archive, &dest))
                .await
                .map_err(|e| SyncError::Extraction(format!("extraction task failed: {e}")))??;

        info!(
            archive_bytes = size,
            files = staged.len(),
            "Extracted {}",
            workspace.filename()
        );
        Ok(FetchOutcome::Staged(staged))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use jradb_common::types::Category;

    fn candidate(url: &str) -> DownloadCandidate {
        DownloadCandidate {
            category: Category::Jjoc,
            url: url.to_string(),
        }
    }

    #[test]
    fn test_archive_format_dispatch() {
        assert_eq!(ArchiveFormat::from_filename("EXjrshos.dat.zip"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_filename("A.ZIP"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_filename("jrsjoc.dat.lzh"), Some(ArchiveFormat::Lzh));
        assert_eq!(ArchiveFormat::from_filename("X.LzH"), Some(ArchiveFormat::Lzh));
        assert_eq!(ArchiveFormat::from_filename("data.txt"), None);
        assert_eq!(ArchiveFormat::from_filename("zip"), None);
    }

    #[test]
    fn test_workspace_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(tmp.path()).unwrap();
        let ws = CandidateWorkspace::new(&run, &candidate("http://jradb.jp/d/jrsjoc.dat.lzh"))
            .unwrap();

        assert_eq!(ws.filename(), "jrsjoc.dat.lzh");
        assert_eq!(ws.download_path(), run.path().join("downloads/jrsjoc.dat.lzh"));
        assert_eq!(ws.extract_dir(), run.path().join("extracted/JJOC"));
    }

    #[test]
    fn test_workspace_rejects_url_without_file_name() {
        let tmp = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(tmp.path()).unwrap();

        for url in ["http://jradb.jp/", "http://jradb.jp/d/..", "nonsense"] {
            let err = CandidateWorkspace::new(&run, &candidate(url)).unwrap_err();
            assert!(matches!(err, SyncError::Download(_)), "{url}");
        }
    }

    #[test]
    fn test_cleanup_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(tmp.path()).unwrap();
        let (download, extract) = {
            let ws = CandidateWorkspace::new(&run, &candidate("http://x/a.zip")).unwrap();
            std::fs::write(ws.download_path(), b"zip").unwrap();
            std::fs::create_dir_all(ws.extract_dir()).unwrap();
            std::fs::write(ws.extract_dir().join("a.dat"), b"a").unwrap();
            (ws.download_path().to_path_buf(), ws.extract_dir().to_path_buf())
        };

        assert!(!download.exists());
        assert!(!extract.exists());
    }

    #[test]
    fn test_explicit_cleanup_tolerates_missing_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(tmp.path()).unwrap();
        let mut ws = CandidateWorkspace::new(&run, &candidate("http://x/a.zip")).unwrap();

        ws.cleanup().unwrap();
        ws.cleanup().unwrap();
    }

    #[test]
    fn test_run_directory_close_removes_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let run = RunDirectory::create(tmp.path()).unwrap();
        let path = run.path().to_path_buf();
        std::fs::write(path.join("downloads/leftover"), b"x").unwrap();

        run.close().unwrap();
        assert!(!path.exists());
    }
}
