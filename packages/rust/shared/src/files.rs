//! Directory listing, scratch files, and in-place replacement.
//!
//! Every stage works on the regular files directly inside one directory
//! and replaces each file through a scratch file beside it, so a reader
//! never observes a half-written file. A symlinked export is rewritten at
//! the file the link points to, and the link itself is left alone.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Result, ScrubError};

/// Prefix of scratch files created next to the file being rewritten.
const SCRATCH_PREFIX: &str = ".xmlscrub-";

/// List regular files directly inside `dir`, sorted by path.
///
/// Subdirectories are skipped; symlinks count when they resolve to a file.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ScrubError::directory(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ScrubError::directory(dir, e))?;
        let path = entry.path();
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => files.push(path),
            Ok(_) => debug!(path = %path.display(), "not a regular file, skipping"),
            Err(e) => debug!(path = %path.display(), error = %e, "unreadable entry, skipping"),
        }
    }

    files.sort();
    Ok(files)
}

/// Path of the file that actually holds `target`'s content.
fn resolve_target(target: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(target).map_err(|e| ScrubError::io(target, e))
}

/// Create a private scratch file beside the file `target` resolves to.
///
/// The file is removed when dropped unless persisted.
pub fn scratch_file(target: &Path) -> Result<NamedTempFile> {
    let resolved = resolve_target(target)?;
    let dir = parent_dir(&resolved);
    tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .suffix(".scratch")
        .tempfile_in(dir)
        .map_err(|e| ScrubError::io(dir, e))
}

/// Move a finished scratch file over `target`.
///
/// The scratch file takes the target's permissions first. Symlinks are
/// followed, so the link survives and its destination gets the new content.
pub fn persist_over(scratch: NamedTempFile, target: &Path) -> Result<()> {
    let resolved = resolve_target(target)?;
    let permissions = std::fs::metadata(&resolved)
        .map_err(|e| ScrubError::io(&resolved, e))?
        .permissions();
    scratch
        .as_file()
        .set_permissions(permissions)
        .map_err(|e| ScrubError::io(scratch.path(), e))?;
    scratch
        .persist(&resolved)
        .map_err(|e| ScrubError::io(&resolved, e.error))?;
    Ok(())
}

/// Replace `target` with `contents` through a scratch file.
pub fn replace_file(target: &Path, contents: &[u8]) -> Result<()> {
    let mut scratch = scratch_file(target)?;
    let scratch_path = scratch.path().to_path_buf();
    scratch
        .write_all(contents)
        .map_err(|e| ScrubError::io(&scratch_path, e))?;
    persist_over(scratch, target)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
