//! All-or-nothing file commits
//!
//! Bodies are staged in a temporary file next to the destination, flushed
//! and synced, then renamed over the destination in one step. Readers see
//! either the previous file or the complete new one, never a prefix.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::downloader::core::{DownloadError, FileOperation, Result};

/// Crash-safe writer for completed transfers
#[derive(Debug, Clone, Copy, Default)]
pub struct DurableWriter;

impl DurableWriter {
    pub fn new() -> Self {
        Self
    }

    /// Atomically write `bytes` to `path`
    ///
    /// `declared_len` is the Content-Length announced by the server. A
    /// non-zero declaration with an empty body is refused so a truncated
    /// response can never replace a good file with an empty one.
    pub fn commit(&self, path: &Path, bytes: &[u8], declared_len: Option<u64>) -> Result<u64> {
        let mut reader = bytes;
        self.commit_from_reader(path, &mut reader, declared_len)
    }

    /// Atomically write everything `reader` yields to `path`
    ///
    /// If reading or writing fails part-way the staged file is discarded and
    /// `path` keeps whatever it held before.
    pub fn commit_from_reader<R: Read>(
        &self,
        path: &Path,
        reader: &mut R,
        declared_len: Option<u64>,
    ) -> Result<u64> {
        let result = stage_and_commit(path, reader, declared_len);
        match &result {
            Ok(written) => debug!("Committed {} bytes to {}", written, path.display()),
            Err(e) => error!("Failed to save {}: {}", path.display(), e),
        }
        result
    }

    /// [`commit`](Self::commit) on the blocking pool
    pub async fn commit_async(&self, path: PathBuf, bytes: Vec<u8>, declared_len: Option<u64>) -> Result<u64> {
        let writer = *self;
        let target = path.clone();
        tokio::task::spawn_blocking(move || writer.commit(&target, &bytes, declared_len))
            .await
            .unwrap_or_else(|join_error| {
                Err(DownloadError::file_system(
                    path,
                    FileOperation::Write,
                    io::Error::other(join_error.to_string()),
                ))
            })
    }
}

fn stage_and_commit<R: Read>(path: &Path, reader: &mut R, declared_len: Option<u64>) -> Result<u64> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .ok_or_else(|| {
            DownloadError::file_system(
                path,
                FileOperation::Create,
                io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent directory"),
            )
        })?;

    let mut staged = tempfile::Builder::new()
        .prefix(".download-")
        .suffix(".part")
        .tempfile_in(parent)
        .map_err(|e| DownloadError::file_system(path, FileOperation::Create, e))?;

    let written = io::copy(reader, &mut staged)
        .map_err(|e| DownloadError::file_system(path, FileOperation::Write, e))?;

    if let Some(declared) = declared_len.filter(|declared| *declared > 0) {
        if written == 0 {
            return Err(DownloadError::EmptyBody {
                path: path.to_path_buf(),
                declared,
            });
        }
    }

    staged
        .flush()
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| DownloadError::file_system(path, FileOperation::Sync, e))?;

    staged
        .persist(path)
        .map_err(|e| DownloadError::file_system(path, FileOperation::Commit, e.error))?;

    sync_directory(parent);
    Ok(written)
}

/// Make the rename itself durable; failure only costs durability, not atomicity
#[cfg(unix)]
fn sync_directory(dir: &Path) {
    if let Err(e) = std::fs::File::open(dir).and_then(|handle| handle.sync_all()) {
        debug!("Could not sync directory {}: {}", dir.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) {}
