//! Raw HTTP access used to verify and download images.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::trace;

use super::validator::ImageFormats;

/// Failure of a single fetch. Always local to one candidate.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Other(String),
}

/// Result of [`HttpFetcher::download`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Download {
    /// The body was written to the destination.
    Saved { bytes: u64 },
    /// The response was not an accepted image; nothing was written.
    NotAnImage { content_type: Option<String> },
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// GET `url` and return its `content-type` without reading the body.
    async fn content_type(&self, url: &str) -> Result<Option<String>, FetchError>;

    /// GET `url` and stream the body to `dest` if its `content-type` is in `formats`.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        formats: &ImageFormats,
    ) -> Result<Download, FetchError>;
}

/// [`HttpFetcher`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        trace!(url = %url, "GET");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

fn content_type_of(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn content_type(&self, url: &str) -> Result<Option<String>, FetchError> {
        let response = self.get(url).await?;
        Ok(content_type_of(&response))
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        formats: &ImageFormats,
    ) -> Result<Download, FetchError> {
        let response = self.get(url).await?;
        let content_type = content_type_of(&response);
        if !content_type.as_deref().is_some_and(|ct| formats.matches(ct)) {
            return Ok(Download::NotAnImage { content_type });
        }

        // The body goes to a sibling file first; `dest` may be served by the
        // live queue and is only replaced once the download is complete.
        let partial = partial_path(dest);
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| FetchError::Io { path, source }
        };

        let written = async {
            let mut file = tokio::fs::File::create(&partial)
                .await
                .map_err(io_err(&partial))?;
            let mut body = response.bytes_stream();
            let mut written = 0u64;
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await.map_err(io_err(&partial))?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(io_err(&partial))?;
            drop(file);
            tokio::fs::rename(&partial, dest)
                .await
                .map_err(io_err(dest))?;
            Ok::<_, FetchError>(written)
        }
        .await;

        match written {
            Ok(bytes) => Ok(Download::Saved { bytes }),
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }
}

/// Unique sibling of `dest` that receives the body while it downloads.
fn partial_path(dest: &Path) -> PathBuf {
    static NEXT_ID: AtomicU64 = AtomicU64::new(0);
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.{id}.part", std::process::id()));
    dest.with_file_name(name)
}
