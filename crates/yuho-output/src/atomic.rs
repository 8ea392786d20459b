//! Write-then-rename helpers.
//!
//! Files are written to a temporary file in the destination directory and
//! persisted over the target, so readers only ever see the old or the new
//! content. Directory trees are staged in a temporary sibling and swapped in.

use crate::error::{OutputError, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::{NamedTempFile, TempDir};

fn parent_of(path: &Path) -> Result<&Path> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| OutputError::io(parent, e))?;
    Ok(parent)
}

/// Atomically replace `path` with `bytes`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = parent_of(path)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(parent)
        .map_err(|e| OutputError::io(parent, e))?;

    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| OutputError::io(tmp.path(), e))?;

    persist(tmp, path)
}

/// Atomically replace `path` with pretty-printed JSON.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_vec_pretty(value)?;
    payload.push(b'\n');
    write_atomic(path, &payload)
}

fn persist(tmp: NamedTempFile, path: &Path) -> Result<()> {
    tmp.persist(path)
        .map_err(|e| OutputError::io(path, e.error))?;
    Ok(())
}

/// A staging directory next to `target`, on the same filesystem.
pub fn staging_dir_for(target: &Path) -> Result<TempDir> {
    let parent = parent_of(target)?;
    tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(parent)
        .map_err(|e| OutputError::io(parent, e))
}

/// Swap a fully built staging directory into `target`, replacing any
/// existing tree.
pub fn replace_dir(staging: TempDir, target: &Path) -> Result<()> {
    let parent = parent_of(target)?;
    let trash = tempfile::Builder::new()
        .prefix(".old-")
        .tempdir_in(parent)
        .map_err(|e| OutputError::io(parent, e))?;

    if target.exists() {
        let old = trash.path().join("tree");
        fs::rename(target, &old).map_err(|e| OutputError::io(target, e))?;
    }
    fs::rename(staging.path(), target).map_err(|e| OutputError::io(target, e))?;

    // The staging path no longer exists, so dropping it is a no-op; dropping
    // `trash` removes the previous tree.
    drop(staging);
    drop(trash);
    Ok(())
}
