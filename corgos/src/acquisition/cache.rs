//! On-disk copies of accepted images.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use crate::Result;
use crate::utils::fs;

/// Folder holding one file per cached image, named after the source URL hash.
#[derive(Debug, Clone)]
pub struct ImageCache {
    folder: PathBuf,
}

impl ImageCache {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Local file for `url`. Stable across passes, so an image is stored once.
    pub fn path_for(&self, url: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(url.as_bytes()));
        let name = match extension_of(url) {
            Some(ext) => format!("{}.{}", &digest[..32], ext),
            None => digest[..32].to_string(),
        };
        self.folder.join(name)
    }

    pub async fn prepare(&self) -> Result<()> {
        fs::ensure_dir_all(&self.folder).await?;
        debug!(folder = %self.folder.display(), "Image cache ready");
        Ok(())
    }

    /// Delete every file that is not in `keep`. Returns the number of files removed.
    pub async fn prune(&self, keep: &HashSet<String>) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.folder).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(fs::io_error("listing", &self.folder, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| fs::io_error("listing", &self.folder, e))?
        {
            let path = entry.path();
            if keep.contains(path.to_string_lossy().as_ref()) {
                continue;
            }
            debug!(path = %path.display(), "Removing stale cached image");
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| fs::io_error("removing", &path, e))?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Remove the folder and its content.
    pub async fn remove(&self) -> Result<()> {
        fs::remove_dir_all_if_exists(&self.folder).await?;
        info!(folder = %self.folder.display(), "Image cache removed");
        Ok(())
    }
}

fn extension_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}
