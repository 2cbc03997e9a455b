//! Setting keys and the typed views built from them.

use std::path::PathBuf;

use reddit_feed::{RedditClientConfig, TimeFilter};

use super::Settings;
use crate::{Error, Result};

pub mod keys {
    pub const REDDIT_CLIENT_ID: &str = "reddit_client_id";
    pub const REDDIT_CLIENT_SECRET: &str = "reddit_client_secret";
    pub const REDDIT_USER_AGENT: &str = "reddit_user_agent";
    pub const REDDIT_SUBREDDITS: &str = "reddit_subreddits";
    pub const REDDIT_MIN_SCORE: &str = "reddit_min_score";
    pub const REDDIT_POSTS_LIMIT: &str = "reddit_posts_limit";
    pub const REDDIT_LISTING_CONCURRENCY: &str = "reddit_praw_concurrent_requests";
    pub const REDDIT_HTTP_CONCURRENCY: &str = "reddit_http_concurrent_requests";
    pub const REDDIT_TIME_FILTER: &str = "reddit_time_filter";
    pub const REDDIT_IMAGE_FORMATS: &str = "reddit_image_formats";
    pub const REDDIT_CACHE_FOLDER: &str = "reddit_cache_folder";
    pub const LOAD_DAYS: &str = "telegram_load_days";
    pub const LOAD_TIME: &str = "telegram_load_time";
}

/// Keys that must be present before the services start.
pub const REQUIRED_KEYS: &[&str] = &[
    keys::REDDIT_CLIENT_ID,
    keys::REDDIT_CLIENT_SECRET,
    keys::REDDIT_USER_AGENT,
    keys::REDDIT_SUBREDDITS,
    keys::REDDIT_MIN_SCORE,
    keys::REDDIT_POSTS_LIMIT,
    keys::REDDIT_LISTING_CONCURRENCY,
    keys::REDDIT_HTTP_CONCURRENCY,
    keys::LOAD_DAYS,
    keys::LOAD_TIME,
];

/// Still-image MIME types accepted when `reddit_image_formats` is absent.
pub const DEFAULT_IMAGE_FORMATS: &[&str] = &["image/png", "image/jpeg", "image/jpg"];

/// Parameters of one acquisition pass. Re-read before every pass.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub subreddits: Vec<String>,
    pub min_score: i64,
    pub posts_limit: usize,
    pub time_filter: TimeFilter,
    pub image_formats: Vec<String>,
    pub cache_folder: Option<PathBuf>,
}

impl AcquisitionConfig {
    pub async fn load(settings: &Settings) -> Result<Self> {
        let subreddits: Vec<String> = settings.get(keys::REDDIT_SUBREDDITS).await?;
        if subreddits.iter().all(|s| s.trim().is_empty()) {
            return Err(Error::invalid_setting(
                keys::REDDIT_SUBREDDITS,
                "at least one subreddit is required",
            ));
        }

        let time_filter = settings
            .get_or(keys::REDDIT_TIME_FILTER, TimeFilter::default().to_string())
            .await?
            .parse::<TimeFilter>()
            .map_err(|e| Error::invalid_setting(keys::REDDIT_TIME_FILTER, e.to_string()))?;

        let default_formats: Vec<String> = DEFAULT_IMAGE_FORMATS.iter().map(|f| f.to_string()).collect();
        let image_formats = settings
            .get_or(keys::REDDIT_IMAGE_FORMATS, default_formats)
            .await?;

        let cache_folder = settings
            .get_or::<Option<String>>(keys::REDDIT_CACHE_FOLDER, None)
            .await?
            .filter(|f| !f.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            subreddits: subreddits
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            min_score: settings.get(keys::REDDIT_MIN_SCORE).await?,
            posts_limit: settings.get(keys::REDDIT_POSTS_LIMIT).await?,
            time_filter,
            image_formats,
            cache_folder,
        })
    }
}

/// Sizes of the two concurrency gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    pub listing_permits: usize,
    pub http_permits: usize,
}

impl LimiterConfig {
    pub async fn load(settings: &Settings) -> Result<Self> {
        let listing_permits: usize = settings.get(keys::REDDIT_LISTING_CONCURRENCY).await?;
        let http_permits: usize = settings.get(keys::REDDIT_HTTP_CONCURRENCY).await?;

        if listing_permits == 0 {
            return Err(Error::invalid_setting(
                keys::REDDIT_LISTING_CONCURRENCY,
                "must be at least 1",
            ));
        }
        if http_permits == 0 {
            return Err(Error::invalid_setting(
                keys::REDDIT_HTTP_CONCURRENCY,
                "must be at least 1",
            ));
        }

        Ok(Self {
            listing_permits,
            http_permits,
        })
    }
}

/// Application credentials for the reddit API.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl RedditCredentials {
    pub async fn load(settings: &Settings) -> Result<Self> {
        Ok(Self {
            client_id: settings.get(keys::REDDIT_CLIENT_ID).await?,
            client_secret: settings.get(keys::REDDIT_CLIENT_SECRET).await?,
            user_agent: settings.get(keys::REDDIT_USER_AGENT).await?,
        })
    }

    pub fn into_client_config(self) -> RedditClientConfig {
        RedditClientConfig::new(self.client_id, self.client_secret, self.user_agent)
    }
}

/// Weekdays (0 = Monday) and minute of the day of the recurring refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub days: Vec<u8>,
    pub minute_of_day: u32,
}

impl ScheduleConfig {
    pub async fn load(settings: &Settings) -> Result<Self> {
        Ok(Self {
            days: settings.get(keys::LOAD_DAYS).await?,
            minute_of_day: settings.get(keys::LOAD_TIME).await?,
        })
    }
}
