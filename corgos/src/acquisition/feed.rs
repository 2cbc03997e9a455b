//! Feed capability consumed by the acquisition pipeline.

use async_trait::async_trait;
use reddit_feed::{MAX_PAGE_SIZE, RedditClient, TimeFilter};

use super::item::CandidateItem;
use crate::Result;

/// What to list: the union of `channels`, best first, within `time_filter`.
#[derive(Debug, Clone)]
pub struct ListingQuery {
    pub channels: Vec<String>,
    pub time_filter: TimeFilter,
}

/// One page of candidates and the cursor of the next one.
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    pub items: Vec<CandidateItem>,
    pub after: Option<String>,
}

/// A source of candidate items, listed page by page.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Largest page the backend serves.
    fn max_page_size(&self) -> usize {
        MAX_PAGE_SIZE
    }

    /// List up to `limit` items, continuing after `after` when given.
    async fn list_top(
        &self,
        query: &ListingQuery,
        limit: usize,
        after: Option<&str>,
    ) -> Result<FeedPage>;
}

/// [`FeedClient`] backed by the reddit API.
pub struct RedditFeed {
    client: RedditClient,
}

impl RedditFeed {
    pub fn new(client: RedditClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedClient for RedditFeed {
    async fn list_top(
        &self,
        query: &ListingQuery,
        limit: usize,
        after: Option<&str>,
    ) -> Result<FeedPage> {
        let page = self
            .client
            .top(&query.channels, query.time_filter, limit, after)
            .await?;

        Ok(FeedPage {
            items: page.items.into_iter().map(CandidateItem::from).collect(),
            after: page.after,
        })
    }
}
