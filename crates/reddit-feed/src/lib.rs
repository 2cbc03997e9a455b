//! Minimal Reddit API client.
//!
//! Only the pieces needed to harvest pictures are implemented:
//! application-only OAuth (client credentials) and paged `top` listings
//! over a multireddit such as `r/corgi+babycorgis`.

mod client;
mod error;
mod models;

pub use client::{ListingPage, MAX_PAGE_SIZE, RedditClient, RedditClientConfig};
pub use error::RedditError;
pub use models::{MediaMetadata, MediaSource, Submission, TimeFilter};
