//! Filesystem helpers shared across modules.
//!
//! These helpers attach the operation and path to IO errors and keep
//! directory handling in one place.

use std::path::Path;

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error("creating directory", path, e))
}

/// Replace the content of `path` by writing a sibling temp file and renaming it.
///
/// Readers of `path` see either the old or the new content, never a
/// truncated file.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| io_error("writing", &tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_error("renaming", path, e))
}

/// Remove a directory and everything in it. Missing directories are fine.
pub async fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error("removing directory", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_replaces_content() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("settings.json");

        write_atomic(&file, b"{\"a\": 1}").await.unwrap();
        write_atomic(&file, b"{\"a\": 2}").await.unwrap();

        let content = tokio::fs::read_to_string(&file).await.unwrap();
        assert_eq!(content, "{\"a\": 2}");
        assert!(!temp.path().join("settings.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_remove_missing_dir_is_ok() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        assert!(remove_dir_all_if_exists(&missing).await.is_ok());

        let present = temp.path().join("cache");
        ensure_dir_all(&present).await.unwrap();
        remove_dir_all_if_exists(&present).await.unwrap();
        assert!(!present.exists());
    }
}
