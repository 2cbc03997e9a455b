//! In-memory fakes of the network capabilities.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::feed::{FeedClient, FeedPage, ListingQuery};
use super::fetcher::{Download, FetchError, HttpFetcher};
use super::item::CandidateItem;
use super::validator::ImageFormats;
use crate::{Error, Result};

enum FakeResponse {
    ContentType(String),
    Failure,
}

/// Answers `content-type` lookups from a fixed table. Unknown URLs fail.
pub(crate) struct FakeFetcher {
    responses: HashMap<String, FakeResponse>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_image(mut self, url: &str, content_type: &str) -> Self {
        self.responses
            .insert(url.to_string(), FakeResponse::ContentType(content_type.to_string()));
        self
    }

    pub fn with_failure(mut self, url: &str) -> Self {
        self.responses.insert(url.to_string(), FakeResponse::Failure);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpFetcher for FakeFetcher {
    async fn content_type(&self, url: &str) -> std::result::Result<Option<String>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        match self.responses.get(url) {
            Some(FakeResponse::ContentType(ct)) => Ok(Some(ct.clone())),
            Some(FakeResponse::Failure) | None => {
                Err(FetchError::Other(format!("connection refused: {url}")))
            }
        }
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        formats: &ImageFormats,
    ) -> std::result::Result<Download, FetchError> {
        match self.content_type(url).await? {
            Some(ct) if formats.matches(&ct) => {
                tokio::fs::write(dest, b"img").await.map_err(|source| FetchError::Io {
                    path: dest.to_path_buf(),
                    source,
                })?;
                Ok(Download::Saved { bytes: 3 })
            }
            content_type => Ok(Download::NotAnImage { content_type }),
        }
    }
}

/// Serves `items` in pages; optionally fails when a given page is requested.
pub(crate) struct FakeFeed {
    items: Vec<CandidateItem>,
    page_size: usize,
    fail_on_page: Option<usize>,
    page_delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeFeed {
    pub fn new(items: Vec<CandidateItem>) -> Self {
        Self {
            items,
            page_size: 100,
            fail_on_page: None,
            page_delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sleep before answering each page, giving spawned work time to run.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = Some(delay);
        self
    }

    pub fn failing_on_page(mut self, page: usize) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedClient for FakeFeed {
    fn max_page_size(&self) -> usize {
        self.page_size
    }

    async fn list_top(
        &self,
        _query: &ListingQuery,
        limit: usize,
        after: Option<&str>,
    ) -> Result<FeedPage> {
        let page = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.page_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_page == Some(page) {
            return Err(Error::Feed("listing unavailable".to_string()));
        }

        let start = after.and_then(|a| a.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + limit.min(self.page_size)).min(self.items.len());
        let items = self.items.get(start..end).unwrap_or_default().to_vec();
        Ok(FeedPage {
            items,
            after: (end < self.items.len()).then(|| end.to_string()),
        })
    }
}

/// Serves `image/jpeg` headers announcing 20 bytes but sends only two, then
/// either hangs or drops the connection. Returns an image URL on it.
pub(crate) async fn truncated_image_server(hang: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-type: image/jpeg\r\ncontent-length: 20\r\n\r\nab",
                    )
                    .await;
                let _ = socket.flush().await;
                if hang {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            });
        }
    });
    format!("http://{addr}/corgo.jpg")
}
