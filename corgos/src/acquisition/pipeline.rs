use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::cache::ImageCache;
use super::feed::{FeedClient, ListingQuery};
use super::fetcher::HttpFetcher;
use super::limiter::FetchLimiter;
use super::staging::StagingSet;
use super::state::{RefreshGuard, RefreshState};
use super::validator::{ContentValidator, ValidationRules};
use crate::queue::ServingQueue;
use crate::settings::{AcquisitionConfig, Settings};
use crate::{Error, Result};

/// One full refresh: list the feed, validate every candidate concurrently,
/// then replace the serving queue with what was accepted.
pub struct AcquisitionPipeline {
    settings: Arc<Settings>,
    feed: Arc<dyn FeedClient>,
    fetcher: Arc<dyn HttpFetcher>,
    limiter: FetchLimiter,
    queue: Arc<ServingQueue>,
    state: RefreshState,
}

impl AcquisitionPipeline {
    pub fn new(
        settings: Arc<Settings>,
        feed: Arc<dyn FeedClient>,
        fetcher: Arc<dyn HttpFetcher>,
        limiter: FetchLimiter,
        queue: Arc<ServingQueue>,
    ) -> Self {
        Self {
            settings,
            feed,
            fetcher,
            limiter,
            queue,
            state: RefreshState::new(),
        }
    }

    pub fn state(&self) -> &RefreshState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn queue(&self) -> &Arc<ServingQueue> {
        &self.queue
    }

    /// Run one pass and return the number of URLs now being served.
    ///
    /// Fails with [`Error::RefreshInProgress`] if another pass is running and
    /// with [`Error::Pipeline`] if the feed cannot be listed; in both cases
    /// the serving queue keeps its previous content.
    pub async fn run(&self) -> Result<usize> {
        let guard = self.state.try_begin().ok_or(Error::RefreshInProgress)?;
        self.run_with_guard(guard).await
    }

    /// Run one pass for a refresh already marked as started through
    /// [`RefreshState::try_begin`]. The flag clears when the pass ends.
    pub async fn run_with_guard(&self, _guard: RefreshGuard) -> Result<usize> {
        let started = Instant::now();
        info!("Loading posts");

        let config = AcquisitionConfig::load(&self.settings).await?;
        let cache = config.cache_folder.clone().map(ImageCache::new);
        if let Some(cache) = &cache {
            cache.prepare().await?;
        }

        let validator = Arc::new(
            ContentValidator::new(
                ValidationRules::from_config(&config),
                self.fetcher.clone(),
                self.limiter.clone(),
            )
            .with_cache(cache.clone()),
        );

        let staging = StagingSet::new();
        let listed = self.collect(&config, validator, &staging).await?;
        let accepted = staging.take().await;

        let loaded = self.queue.swap(accepted.iter().cloned()).await;

        if let Some(cache) = &cache {
            match cache.prune(&accepted).await {
                Ok(removed) => debug!(removed, "Pruned image cache"),
                Err(e) => warn!(error = %e, "Failed to prune image cache"),
            }
        }

        info!(
            listed,
            loaded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Posts loaded"
        );
        Ok(loaded)
    }

    /// Page through the feed, spawning one validation task per candidate.
    /// Returns how many candidates were listed.
    async fn collect(
        &self,
        config: &AcquisitionConfig,
        validator: Arc<ContentValidator>,
        staging: &StagingSet,
    ) -> Result<usize> {
        let query = ListingQuery {
            channels: config.subreddits.clone(),
            time_filter: config.time_filter,
        };
        let max_page_size = self.feed.max_page_size().max(1);

        // Dropping the set on an early return aborts the tasks still running.
        let mut tasks = JoinSet::new();
        let mut listed = 0usize;
        let mut after: Option<String> = None;

        while listed < config.posts_limit {
            let remaining = config.posts_limit - listed;
            let page = {
                let _permit = self.limiter.listing_permit().await?;
                self.feed
                    .list_top(&query, remaining.min(max_page_size), after.as_deref())
                    .await
            };
            let page = page.map_err(|e| {
                error!(error = %e, listed, "Failed to list posts");
                Error::pipeline(format!("cannot list posts: {e}"))
            })?;

            let count = page.items.len().min(remaining);
            debug!(count, after = ?after, "Fetched listing page");
            for item in page.items.into_iter().take(count) {
                let validator = validator.clone();
                let staging = staging.clone();
                tasks.spawn(async move {
                    let urls = validator.validate(&item).await;
                    staging.insert_all(urls).await;
                });
            }
            listed += count;

            match page.after {
                Some(next) if count > 0 => after = Some(next),
                _ => break,
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Validation task failed");
            }
        }

        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};
    use std::path::Path;
    use std::time::Duration;

    use serde_json::{Value, json};
    use tempfile::TempDir;

    use super::*;
    use crate::acquisition::item::{CandidateItem, GalleryEntry};
    use crate::acquisition::ReqwestFetcher;
    use crate::acquisition::testing::{FakeFeed, FakeFetcher, truncated_image_server};
    use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_http_client};
    use crate::settings::{LimiterConfig, SettingsRegistry};

    async fn settings(dir: &Path, extra: Value) -> Arc<Settings> {
        let mut content = json!({
            "reddit_subreddits": ["corgi"],
            "reddit_min_score": 10,
            "reddit_posts_limit": 100,
        });
        if let (Value::Object(base), Value::Object(extra)) = (&mut content, extra) {
            base.extend(extra);
        }
        let path = dir.join("settings.json");
        tokio::fs::write(&path, content.to_string()).await.unwrap();
        let settings = SettingsRegistry::new().open(&path);
        settings.load().await.unwrap();
        settings
    }

    fn limiter() -> FetchLimiter {
        FetchLimiter::new(LimiterConfig {
            listing_permits: 2,
            http_permits: 3,
        })
    }

    fn image(n: usize) -> String {
        format!("https://i.redd.it/{n}.jpg")
    }

    fn pipeline(
        settings: Arc<Settings>,
        feed: Arc<FakeFeed>,
        fetcher: FakeFetcher,
        queue: Arc<ServingQueue>,
    ) -> AcquisitionPipeline {
        AcquisitionPipeline::new(settings, feed, Arc::new(fetcher), limiter(), queue)
    }

    async fn served(queue: &ServingQueue) -> HashSet<String> {
        queue.snapshot().await.into_iter().collect()
    }

    #[tokio::test]
    async fn test_run_fills_queue() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path(), json!({})).await;

        let mut gallery = CandidateItem {
            source_url: "https://www.reddit.com/gallery/abc".to_string(),
            score: 50,
            is_gallery: true,
            ..Default::default()
        };
        gallery.gallery_entries = BTreeMap::from([
            (
                "g1".to_string(),
                GalleryEntry {
                    format: Some("image/jpg".to_string()),
                    representative_url: Some("https://preview.redd.it/g1.jpg".to_string()),
                },
            ),
            (
                "g2".to_string(),
                GalleryEntry {
                    format: Some("image/gif".to_string()),
                    representative_url: Some("https://preview.redd.it/g2.gif".to_string()),
                },
            ),
        ]);

        let feed = Arc::new(FakeFeed::new(vec![
            CandidateItem::link(image(1), 20),
            CandidateItem::link(image(1), 30),
            CandidateItem::link(image(2), 5),
            CandidateItem::link("https://v.redd.it/clip", 99),
            gallery,
        ]));
        let fetcher = FakeFetcher::new()
            .with_image(&image(1), "image/jpeg")
            .with_image(&image(2), "image/jpeg")
            .with_image("https://preview.redd.it/g2.gif", "image/gif");
        let queue = Arc::new(ServingQueue::new());

        let loaded = pipeline(settings, feed, fetcher, queue.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(loaded, 2);
        assert_eq!(
            served(&queue).await,
            HashSet::from([image(1), "https://preview.redd.it/g1.jpg".to_string()])
        );
    }

    #[tokio::test]
    async fn test_failed_check_only_drops_its_item() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path(), json!({})).await;

        let feed = Arc::new(FakeFeed::new((1..=5).map(|n| CandidateItem::link(image(n), 100)).collect()));
        let fetcher = (1..=5)
            .filter(|n| *n != 3)
            .fold(FakeFetcher::new(), |f, n| f.with_image(&image(n), "image/png"))
            .with_failure(&image(3));
        let queue = Arc::new(ServingQueue::new());

        let loaded = pipeline(settings, feed, fetcher, queue.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(loaded, 4);
        assert!(!served(&queue).await.contains(&image(3)));
    }

    #[tokio::test]
    async fn test_pages_until_limit() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path(), json!({ "reddit_posts_limit": 5 })).await;

        let items: Vec<CandidateItem> = (1..=8).map(|n| CandidateItem::link(image(n), 100)).collect();
        let fetcher = (1..=8).fold(FakeFetcher::new(), |f, n| f.with_image(&image(n), "image/png"));
        let feed = Arc::new(FakeFeed::new(items).with_page_size(2));
        let queue = Arc::new(ServingQueue::new());

        let loaded = pipeline(settings, feed.clone(), fetcher, queue.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(loaded, 5);
        assert_eq!(feed.calls(), 3);
        assert_eq!(served(&queue).await, (1..=5).map(image).collect::<HashSet<_>>());
    }

    #[tokio::test]
    async fn test_listing_failure_keeps_previous_queue() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path(), json!({ "reddit_posts_limit": 6 })).await;

        let items: Vec<CandidateItem> = (1..=6).map(|n| CandidateItem::link(image(n), 100)).collect();
        let fetcher = (1..=6).fold(FakeFetcher::new(), |f, n| f.with_image(&image(n), "image/png"));
        let feed = Arc::new(FakeFeed::new(items).with_page_size(2).failing_on_page(1));
        let queue = Arc::new(ServingQueue::with_items(vec!["old".to_string()]));

        let pipeline = pipeline(settings, feed, fetcher, queue.clone());
        let result = pipeline.run().await;

        assert!(matches!(result, Err(Error::Pipeline(_))));
        assert_eq!(queue.snapshot().await, vec!["old".to_string()]);
        assert!(!pipeline.is_loading());
    }

    #[tokio::test]
    async fn test_rejects_concurrent_run() {
        let dir = TempDir::new().unwrap();
        let settings = settings(dir.path(), json!({})).await;
        let feed = Arc::new(FakeFeed::new(vec![CandidateItem::link(image(1), 100)]));
        let queue = Arc::new(ServingQueue::with_items(vec!["old".to_string()]));
        let pipeline = pipeline(settings, feed.clone(), FakeFetcher::new(), queue.clone());

        let _running = pipeline.state().try_begin().unwrap();
        assert!(pipeline.is_loading());
        assert!(matches!(pipeline.run().await, Err(Error::RefreshInProgress)));
        assert_eq!(feed.calls(), 0);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_cache_mode_serves_local_files() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("cache");
        let settings = settings(
            dir.path(),
            json!({ "reddit_cache_folder": cache_dir.to_string_lossy() }),
        )
        .await;

        tokio::fs::create_dir_all(&cache_dir).await.unwrap();
        let stale = cache_dir.join("stale.jpg");
        tokio::fs::write(&stale, b"old").await.unwrap();

        let feed = Arc::new(FakeFeed::new(vec![
            CandidateItem::link(image(1), 100),
            CandidateItem::link(image(2), 100),
        ]));
        let fetcher = FakeFetcher::new()
            .with_image(&image(1), "image/jpeg")
            .with_image(&image(2), "text/html");
        let queue = Arc::new(ServingQueue::new());

        let loaded = pipeline(settings, feed, fetcher, queue.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(loaded, 1);
        let path = queue.take_next().await.unwrap();
        assert!(Path::new(&path).starts_with(&cache_dir));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"img");
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn test_aborted_pass_keeps_served_cache_files() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("cache");
        let settings = settings(
            dir.path(),
            json!({
                "reddit_posts_limit": 5,
                "reddit_cache_folder": cache_dir.to_string_lossy(),
            }),
        )
        .await;

        let url = truncated_image_server(true).await;
        let cache = ImageCache::new(&cache_dir);
        cache.prepare().await.unwrap();
        let served_path = cache.path_for(&url);
        tokio::fs::write(&served_path, b"FULL-OLD-IMAGE-BYTES").await.unwrap();
        let served_url = served_path.to_string_lossy().into_owned();
        let queue = Arc::new(ServingQueue::with_items(vec![served_url.clone()]));

        let feed = Arc::new(
            FakeFeed::new(vec![
                CandidateItem::link(url.clone(), 100),
                CandidateItem::link(image(2), 100),
            ])
            .with_page_size(1)
            .with_page_delay(Duration::from_millis(300))
            .failing_on_page(1),
        );
        let fetcher = ReqwestFetcher::new(
            build_http_client("corgos-test", DEFAULT_REQUEST_TIMEOUT).unwrap(),
        );
        let pipeline = AcquisitionPipeline::new(settings, feed, Arc::new(fetcher), limiter(), queue.clone());

        let result = pipeline.run().await;

        assert!(matches!(result, Err(Error::Pipeline(_))));
        assert_eq!(queue.snapshot().await, vec![served_url]);
        assert_eq!(
            tokio::fs::read(&served_path).await.unwrap(),
            b"FULL-OLD-IMAGE-BYTES"
        );
    }
}
