//! Filesystem utilities.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

/// Write a string to a file atomically, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    write_atomic(path, contents.as_bytes())
        .with_context(|| format!("failed to write file: {}", path.display()))
}

/// Replace `path` with `contents` without ever exposing a partial file.
///
/// The data goes to a temporary file in the destination directory which is
/// then renamed over the target, so readers see either the old or the new
/// contents.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Make a path absolute without requiring it to exist.
///
/// Existing paths are canonicalized; others are joined onto the current
/// directory.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to read the current directory")?;
    Ok(cwd.join(path))
}

/// Get the relative path from `base` to `path`.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}
