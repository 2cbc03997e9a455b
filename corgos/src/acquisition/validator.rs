//! Acceptance rules for candidate items.
//!
//! Cheap checks (pinned, self text, score, link markers) run first; the
//! remaining candidates are verified over the network, under the HTTP gate,
//! by looking at the `content-type` of the response.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, trace, warn};

use super::cache::ImageCache;
use super::fetcher::{Download, FetchError, HttpFetcher};
use super::item::{CandidateItem, GalleryEntry};
use super::limiter::FetchLimiter;
use crate::settings::AcquisitionConfig;

/// URL fragments of links that never resolve to a still image.
const NON_IMAGE_MARKERS: &[&str] = &["v.redd.it", ".gif", ".mp4"];

/// Allow-list of still-image MIME types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFormats(Vec<String>);

impl ImageFormats {
    pub fn new<I, S>(formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            formats
                .into_iter()
                .map(|f| f.as_ref().trim().to_ascii_lowercase())
                .collect(),
        )
    }

    /// Whether a `content-type` value names an allowed format. Parameters such
    /// as `; charset=...` are ignored.
    pub fn matches(&self, content_type: &str) -> bool {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.0.iter().any(|f| *f == media_type)
    }
}

/// Why a candidate was dropped before any network access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Pinned,
    SelfText,
    LowScore { score: i64, min_score: i64 },
    NotAnImageLink,
}

#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub min_score: i64,
    pub formats: ImageFormats,
}

impl ValidationRules {
    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self {
            min_score: config.min_score,
            formats: ImageFormats::new(&config.image_formats),
        }
    }

    pub fn precheck(&self, item: &CandidateItem) -> Result<(), Rejection> {
        if item.is_pinned {
            return Err(Rejection::Pinned);
        }
        if item.is_self_text {
            return Err(Rejection::SelfText);
        }
        if item.score < self.min_score {
            return Err(Rejection::LowScore {
                score: item.score,
                min_score: self.min_score,
            });
        }
        let url = item.source_url.to_ascii_lowercase();
        if NON_IMAGE_MARKERS.iter().any(|m| url.contains(m)) {
            return Err(Rejection::NotAnImageLink);
        }
        Ok(())
    }
}

/// Turns a candidate into zero or more accepted URLs.
///
/// With an [`ImageCache`] attached, verification downloads the image and the
/// accepted value is the local file path instead of the remote URL.
pub struct ContentValidator {
    rules: ValidationRules,
    fetcher: Arc<dyn HttpFetcher>,
    limiter: FetchLimiter,
    cache: Option<ImageCache>,
}

impl ContentValidator {
    pub fn new(rules: ValidationRules, fetcher: Arc<dyn HttpFetcher>, limiter: FetchLimiter) -> Self {
        Self {
            rules,
            fetcher,
            limiter,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<ImageCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    /// Validate one candidate. Network failures reject the affected URL only.
    pub async fn validate(&self, item: &CandidateItem) -> Vec<String> {
        if let Err(reason) = self.rules.precheck(item) {
            debug!(url = %item.source_url, reason = ?reason, "Skipping post");
            return Vec::new();
        }

        if item.is_gallery {
            return self.validate_gallery(item).await;
        }

        self.accept(&item.source_url, false)
            .await
            .into_iter()
            .collect()
    }

    async fn validate_gallery(&self, item: &CandidateItem) -> Vec<String> {
        trace!(url = %item.source_url, entries = item.gallery_entries.len(), "Scraping gallery");
        let checks = item
            .gallery_entries
            .iter()
            .filter_map(|(id, entry)| self.gallery_target(id, entry))
            .map(|(url, declared_image)| self.accept(url, declared_image));

        let urls: Vec<String> = join_all(checks).await.into_iter().flatten().collect();
        debug!(url = %item.source_url, found = urls.len(), "Gallery scraped");
        urls
    }

    /// URL to verify for a gallery entry and whether the feed already declared
    /// it as an accepted still image.
    fn gallery_target<'a>(&self, id: &str, entry: &'a GalleryEntry) -> Option<(&'a str, bool)> {
        let Some(format) = entry.format.as_deref() else {
            debug!(entry = %id, "Gallery entry has no format, skipping");
            return None;
        };
        let Some(url) = entry.representative_url.as_deref() else {
            debug!(entry = %id, "Gallery entry has no image, skipping");
            return None;
        };
        Some((url, self.rules.formats.matches(format)))
    }

    async fn accept(&self, url: &str, declared_image: bool) -> Option<String> {
        let outcome = match &self.cache {
            Some(cache) => self.download(cache, url).await,
            None if declared_image => Ok(Some(url.to_string())),
            None => self.check(url).await,
        };

        outcome.unwrap_or_else(|e| {
            warn!(url = %url, error = %e, "Cannot verify image, skipping");
            None
        })
    }

    async fn check(&self, url: &str) -> Result<Option<String>, FetchError> {
        let _permit = self.http_permit().await?;
        match self.fetcher.content_type(url).await? {
            Some(ct) if self.rules.formats.matches(&ct) => Ok(Some(url.to_string())),
            other => {
                debug!(url = %url, format = ?other, "Url is not an image, skipping");
                Ok(None)
            }
        }
    }

    async fn download(&self, cache: &ImageCache, url: &str) -> Result<Option<String>, FetchError> {
        let dest = cache.path_for(url);
        let _permit = self.http_permit().await?;
        match self.fetcher.download(url, &dest, &self.rules.formats).await? {
            Download::Saved { bytes } => {
                trace!(url = %url, path = %dest.display(), bytes, "Image cached");
                Ok(Some(dest.to_string_lossy().into_owned()))
            }
            Download::NotAnImage { content_type } => {
                debug!(url = %url, format = ?content_type, "Url is not an image, skipping");
                Ok(None)
            }
        }
    }

    async fn http_permit(&self) -> Result<tokio::sync::OwnedSemaphorePermit, FetchError> {
        self.limiter
            .http_permit()
            .await
            .map_err(|e| FetchError::Other(e.to_string()))
    }
}
