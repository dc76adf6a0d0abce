//! Archive extraction
//!
//! # Supported Formats
//!
//! - **Zip** (.zip): using the zip crate, entry paths sanitized by `enclosed_name`
//! - **LZH/LHA** (.lzh): using delharc, every member CRC-checked
//!
//! Both extractors are blocking and are run on the blocking pool by the
//! pipeline.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{ArchiveFormat, StagedFile};
use crate::error::{Result, SyncError};

/// Extract `archive` into `dest` and return the staged files.
///
/// `dest` must exist. See [`staged_files`] for what gets staged.
pub fn extract(format: ArchiveFormat, archive: &Path, dest: &Path) -> Result<Vec<StagedFile>> {
    let members = match format {
        ArchiveFormat::Zip => extract_zip(archive, dest)?,
        ArchiveFormat::Lzh => extract_lzh(archive, dest)?,
    };
    debug!(?format, members, dest = %dest.display(), "Archive extracted");

    staged_files(dest)
}

/// Extract every entry of a zip archive, returning the number of entries
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| SyncError::Extraction(format!("not a zip archive: {e}")))?;
    let entries = zip.len();
    zip.extract(dest)
        .map_err(|e| SyncError::Extraction(format!("zip extraction failed: {e}")))?;
    Ok(entries)
}

/// Extract every file member of an LZH archive, returning the number written.
///
/// Member names are used byte-for-byte with any directory part removed.
pub fn extract_lzh(archive: &Path, dest: &Path) -> Result<usize> {
    let mut reader = delharc::parse_file(archive)
        .map_err(|e| SyncError::Extraction(format!("not an LZH archive: {e}")))?;
    let mut written = 0;

    loop {
        let header = reader.header();
        if !header.is_directory() {
            let raw_name = member_file_name(&header.filename).to_vec();
            if raw_name.is_empty() || raw_name == b"." || raw_name == b".." {
                warn!(
                    name = %String::from_utf8_lossy(&header.filename),
                    "Skipping LZH member without a usable file name"
                );
            } else if !reader.is_decoder_supported() {
                return Err(SyncError::Extraction(format!(
                    "unsupported LZH compression method for {}",
                    String::from_utf8_lossy(&raw_name)
                )));
            } else {
                let target = dest.join(os_file_name(&raw_name));
                let mut out = File::create(&target)?;
                io::copy(&mut reader, &mut out).map_err(|e| {
                    SyncError::Extraction(format!(
                        "failed to decompress {}: {e}",
                        String::from_utf8_lossy(&raw_name)
                    ))
                })?;
                reader.crc_check().map_err(|e| {
                    SyncError::Extraction(format!(
                        "CRC mismatch for {}: {e}",
                        String::from_utf8_lossy(&raw_name)
                    ))
                })?;
                written += 1;
            }
        }

        let more = reader
            .next_file()
            .map_err(|e| SyncError::Extraction(format!("corrupt LZH archive: {e}")))?;
        if !more {
            break;
        }
    }

    Ok(written)
}

/// Last path component of a raw LZH member name.
///
/// LZH archives use `\`, `/` or `0xFF` as directory separators depending on
/// the tool that produced them.
pub fn member_file_name(raw: &[u8]) -> &[u8] {
    raw.rsplit(|b| matches!(b, b'/' | b'\\' | 0xFF))
        .next()
        .unwrap_or(raw)
}

#[cfg(unix)]
fn os_file_name(raw: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(raw))
}

#[cfg(not(unix))]
fn os_file_name(raw: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(raw).into_owned())
}

/// Every regular file under `dir`, flattened to its file name.
///
/// Files are visited in path order; a file whose name was already staged
/// from another sub-directory is skipped with a warning. Entries that are
/// neither files nor directories are skipped too. An extraction that
/// produced entries but no publishable file is an error.
pub fn staged_files(dir: &Path) -> Result<Vec<StagedFile>> {
    let mut files: Vec<StagedFile> = Vec::new();
    let mut unstaged = 0usize;
    collect_files(dir, dir, &mut files, &mut unstaged)?;

    if files.is_empty() && unstaged > 0 {
        return Err(SyncError::Extraction(format!(
            "archive produced {unstaged} entries but no regular files"
        )));
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

fn collect_files(
    root: &Path,
    dir: &Path,
    files: &mut Vec<StagedFile>,
    unstaged: &mut usize,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path).display().to_string();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            debug!(dir = %relative, "Descending into extracted directory");
            *unstaged += 1;
            collect_files(root, &path, files, unstaged)?;
        } else if file_type.is_file() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if files.iter().any(|f| f.name == name) {
                warn!(file = %relative, "Another extracted file has the same name, skipping");
                *unstaged += 1;
                continue;
            }
            files.push(StagedFile {
                name,
                size: entry.metadata()?.len(),
                path,
            });
        } else {
            warn!(entry = %relative, "Skipping extracted entry that is not a regular file");
            *unstaged += 1;
        }
    }
    Ok(())
}
