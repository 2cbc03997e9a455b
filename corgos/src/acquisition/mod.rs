//! Content acquisition.
//!
//! A pass lists the top posts of the configured subreddits, validates every
//! candidate concurrently behind two independent concurrency gates, collects
//! accepted URLs into a [`StagingSet`] and finally swaps them into the
//! [`ServingQueue`](crate::queue::ServingQueue).

mod cache;
mod feed;
mod fetcher;
mod item;
mod limiter;
mod pipeline;
mod staging;
mod state;
mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::ImageCache;
pub use feed::{FeedClient, FeedPage, ListingQuery, RedditFeed};
pub use fetcher::{Download, FetchError, HttpFetcher, ReqwestFetcher};
pub use item::{CandidateItem, GalleryEntry};
pub use limiter::FetchLimiter;
pub use pipeline::AcquisitionPipeline;
pub use staging::StagingSet;
pub use state::{RefreshGuard, RefreshState};
pub use validator::{ContentValidator, ImageFormats, Rejection, ValidationRules};
