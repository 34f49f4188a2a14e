//! Local filesystem enumeration for directory uploads.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::keys::SEPARATOR;

/// A file found under an upload root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Absolute or caller-relative path on disk.
    pub path: PathBuf,
    /// Path relative to the root, `/`-separated.
    pub relative: String,
}

/// Recursively lists regular files under `root`, sorted by relative path.
///
/// An entry is skipped (with its whole subtree, for directories) when its
/// full path or its root-relative path is in `exclude`.
///
/// # Errors
///
/// Returns an error if `root` is not a directory or cannot be read.
pub async fn walk_directory(root: &Path, exclude: &BTreeSet<String>) -> Result<Vec<LocalFile>> {
    if !fs::metadata(root).await.is_ok_and(|m| m.is_dir()) {
        return Err(ConfigError::FileNotFound {
            path: root.to_path_buf(),
        }
        .into());
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let relative = relative_key(root, &path);

            if exclude.contains(&relative) || exclude.contains(&path.display().to_string()) {
                debug!("Skipping excluded path: {}", path.display());
                continue;
            }

            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                files.push(LocalFile { path, relative });
            }
        }
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Builds the `/`-separated path of `path` relative to `root`.
fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string())
}
