use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RedditError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited by reddit (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid time filter: {0}")]
    InvalidTimeFilter(String),
    #[error("no subreddits given")]
    NoSubreddits,
}
