//! Service container.
//!
//! Builds every service from the settings file, then owns their lifecycle:
//! `start` kicks off the initial and recurring refreshes, `shutdown` stops
//! them and persists the settings.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reddit_feed::RedditClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::acquisition::{
    AcquisitionPipeline, FeedClient, FetchLimiter, HttpFetcher, ImageCache, RedditFeed,
    ReqwestFetcher,
};
use crate::delivery::DeliveryService;
use crate::queue::ServingQueue;
use crate::scheduler::{RefreshEvent, RefreshSchedule, RefreshScheduler};
use crate::settings::config::REQUIRED_KEYS;
use crate::settings::{
    AcquisitionConfig, LimiterConfig, RedditCredentials, ScheduleConfig, Settings,
    SettingsRegistry,
};
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_http_client};

/// Default shutdown timeout.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Service container holding all application services.
pub struct ServiceContainer {
    /// Settings store shared by every service.
    pub settings: Arc<Settings>,
    /// Live queue of images being served.
    pub queue: Arc<ServingQueue>,
    pub pipeline: Arc<AcquisitionPipeline>,
    pub scheduler: Arc<RefreshScheduler>,
    /// Entry points for the chat front end.
    pub delivery: Arc<DeliveryService>,
    /// Cancellation token for graceful shutdown.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Load the settings at `path` and build the services on top of the
    /// reddit API.
    pub async fn new(registry: &SettingsRegistry, path: impl AsRef<Path>) -> Result<Self> {
        info!("Initializing service container");

        let settings = registry.open(path);
        settings.load().await?;
        settings.validate(REQUIRED_KEYS).await?;

        let credentials = RedditCredentials::load(&settings).await?;
        debug!(credentials = ?credentials, "Loaded reddit credentials");

        let http = build_http_client(&credentials.user_agent, DEFAULT_REQUEST_TIMEOUT)?;
        let feed = Arc::new(RedditFeed::new(RedditClient::new(
            credentials.into_client_config(),
            http.clone(),
        )));
        let fetcher = Arc::new(ReqwestFetcher::new(http));

        Self::with_components(settings, feed, fetcher).await
    }

    /// Build the services from already loaded settings and the given network
    /// capabilities.
    pub async fn with_components(
        settings: Arc<Settings>,
        feed: Arc<dyn FeedClient>,
        fetcher: Arc<dyn HttpFetcher>,
    ) -> Result<Self> {
        let limiter = FetchLimiter::new(LimiterConfig::load(&settings).await?);
        let schedule = RefreshSchedule::from_config(&ScheduleConfig::load(&settings).await?)?;

        let cancellation_token = CancellationToken::new();
        let queue = Arc::new(ServingQueue::new());
        let pipeline = Arc::new(AcquisitionPipeline::new(
            settings.clone(),
            feed,
            fetcher,
            limiter,
            queue.clone(),
        ));
        let scheduler = Arc::new(RefreshScheduler::new(
            pipeline.clone(),
            schedule,
            cancellation_token.child_token(),
        ));
        let delivery = Arc::new(DeliveryService::new(queue.clone(), scheduler.clone()));

        info!("Service container initialized");
        Ok(Self {
            settings,
            queue,
            pipeline,
            scheduler,
            delivery,
            cancellation_token,
        })
    }

    /// Prepare the image cache and start refreshing.
    pub async fn start(&self) -> Result<()> {
        if let Some(cache) = self.image_cache().await? {
            cache.prepare().await?;
        }
        self.setup_refresh_event_logging();
        self.scheduler.start();
        info!("Services started");
        Ok(())
    }

    /// Shutdown all services gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Shutdown all services gracefully with a custom timeout.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<()> {
        info!("Shutting down services (timeout: {:?})", timeout);
        self.cancellation_token.cancel();
        self.scheduler.shutdown(timeout).await;

        match self.image_cache().await {
            Ok(Some(cache)) => cache.remove().await?,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Cannot read cache folder setting, leaving cache in place"),
        }

        self.settings.save().await?;
        info!("Services shut down");
        Ok(())
    }

    /// Get the cancellation token for external use.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Check if shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    async fn image_cache(&self) -> Result<Option<ImageCache>> {
        let config = AcquisitionConfig::load(&self.settings).await?;
        Ok(config.cache_folder.map(ImageCache::new))
    }

    fn setup_refresh_event_logging(&self) {
        let mut receiver = self.scheduler.subscribe();
        let cancellation_token = self.cancellation_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        debug!("Refresh event handler shutting down");
                        break;
                    }
                    result = receiver.recv() => {
                        match result {
                            Ok(RefreshEvent::Started) => info!("Posts are being loaded"),
                            Ok(RefreshEvent::Completed { loaded }) => info!(loaded, "Posts loaded"),
                            Ok(RefreshEvent::Failed { reason }) => warn!(reason = %reason, "Posts could not be loaded"),
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                                warn!("Refresh event handler lagged by {} events", n);
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::Error;
    use crate::acquisition::CandidateItem;
    use crate::acquisition::testing::{FakeFeed, FakeFetcher};

    const IMAGE: &str = "https://i.redd.it/sploot.png";

    fn settings_json(cache: Option<&Path>) -> serde_json::Value {
        json!({
            "reddit_client_id": "id",
            "reddit_client_secret": "secret",
            "reddit_user_agent": "corgos-test",
            "reddit_subreddits": ["corgi"],
            "reddit_min_score": 1,
            "reddit_posts_limit": 10,
            "reddit_praw_concurrent_requests": 1,
            "reddit_http_concurrent_requests": 2,
            "reddit_cache_folder": cache.map(|p| p.to_string_lossy().into_owned()),
            "telegram_load_days": [0, 3],
            "telegram_load_time": 600,
        })
    }

    async fn container(dir: &TempDir, cache: Option<&Path>) -> ServiceContainer {
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, settings_json(cache).to_string())
            .await
            .unwrap();
        let settings = SettingsRegistry::new().open(&path);
        settings.load().await.unwrap();

        ServiceContainer::with_components(
            settings,
            Arc::new(FakeFeed::new(vec![CandidateItem::link(IMAGE, 5)])),
            Arc::new(FakeFetcher::new().with_image(IMAGE, "image/png")),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_new_rejects_missing_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, json!({ "reddit_client_id": "id" }).to_string())
            .await
            .unwrap();

        let result = ServiceContainer::new(&SettingsRegistry::new(), &path).await;
        assert!(matches!(result, Err(Error::KeyNotFound { .. })));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("cache");
        let container = container(&dir, Some(&cache_dir)).await;
        let mut events = container.scheduler.subscribe();

        container.start().await.unwrap();
        assert!(cache_dir.is_dir());

        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            if let RefreshEvent::Completed { loaded } = event {
                assert_eq!(loaded, 1);
                break;
            }
        }
        assert_eq!(container.queue.len().await, 1);

        container.shutdown_with_timeout(Duration::from_secs(2)).await.unwrap();
        assert!(container.is_shutting_down());
        assert!(!cache_dir.exists());
        assert!(dir.path().join("settings.json").exists());
    }
}
