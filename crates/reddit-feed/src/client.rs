use std::time::{Duration, Instant};

use reqwest::header::{RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::RedditError;
use crate::models::{AccessTokenResponse, Listing, Submission, TimeFilter};

/// Largest `limit` accepted by listing endpoints.
pub const MAX_PAGE_SIZE: usize = 100;

const DEFAULT_AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";
const DEFAULT_API_URL: &str = "https://oauth.reddit.com";

/// Tokens are refreshed this long before reddit says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME: u64 = 3600;

/// Credentials and endpoints of a script/application client.
#[derive(Debug, Clone)]
pub struct RedditClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    /// Full URL of the token endpoint.
    pub auth_url: String,
    /// Base URL of the OAuth API host.
    pub api_url: String,
}

impl RedditClientConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            user_agent: user_agent.into(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Point the client at different hosts (used by tests and proxies).
    pub fn with_endpoints(mut self, auth_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self.api_url = api_url.into();
        self
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub items: Vec<Submission>,
    /// Cursor of the next page, `None` when the listing is exhausted.
    pub after: Option<String>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Application-only OAuth client for reddit listings.
pub struct RedditClient {
    config: RedditClientConfig,
    client: Client,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    pub fn new(config: RedditClientConfig, client: Client) -> Self {
        Self {
            config,
            client,
            token: Mutex::new(None),
        }
    }

    /// Fetch one page of the `top` listing of the union of `subreddits`.
    ///
    /// `limit` is clamped to `1..=MAX_PAGE_SIZE`. Pass the `after` cursor of
    /// the previous page to continue a listing.
    pub async fn top(
        &self,
        subreddits: &[String],
        time_filter: TimeFilter,
        limit: usize,
        after: Option<&str>,
    ) -> Result<ListingPage, RedditError> {
        let url = self.listing_url(subreddits, time_filter, limit, after)?;
        debug!(url = %url, "Requesting listing");

        let mut refreshed = false;
        loop {
            let token = self.access_token().await?;
            let response = self
                .client
                .get(url.clone())
                .bearer_auth(&token)
                .header(USER_AGENT, &self.config.user_agent)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !refreshed {
                debug!("Access token rejected, requesting a new one");
                self.invalidate_token().await;
                refreshed = true;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                warn!(retry_after = ?retry_after, "Reddit rate limit hit");
                return Err(RedditError::RateLimited { retry_after });
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(RedditError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let body = response.bytes().await?;
            let listing: Listing = serde_json::from_slice(&body)?;
            return Ok(Self::into_page(listing));
        }
    }

    fn into_page(listing: Listing) -> ListingPage {
        let mut items = Vec::with_capacity(listing.data.children.len());
        for thing in listing.data.children {
            if thing.kind != "t3" {
                trace!(kind = %thing.kind, "Skipping non-link thing");
                continue;
            }
            match serde_json::from_value::<Submission>(thing.data) {
                Ok(submission) => items.push(submission),
                Err(e) => warn!(error = %e, "Skipping malformed submission"),
            }
        }

        ListingPage {
            items,
            after: listing.data.after.filter(|a| !a.is_empty()),
        }
    }

    fn listing_url(
        &self,
        subreddits: &[String],
        time_filter: TimeFilter,
        limit: usize,
        after: Option<&str>,
    ) -> Result<Url, RedditError> {
        if subreddits.is_empty() {
            return Err(RedditError::NoSubreddits);
        }

        let base = self.config.api_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{}/r/{}/top", base, subreddits.join("+")))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("t", time_filter.as_str())
                .append_pair("limit", &limit.clamp(1, MAX_PAGE_SIZE).to_string())
                .append_pair("raw_json", "1");
            if let Some(after) = after {
                query.append_pair("after", after);
            }
        }
        Ok(url)
    }

    async fn access_token(&self) -> Result<String, RedditError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.value.clone());
        }

        let token = self.request_token().await?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        self.token.lock().await.take();
    }

    async fn request_token(&self) -> Result<AccessToken, RedditError> {
        debug!("Requesting reddit access token");
        let response = self
            .client
            .post(&self.config.auth_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(USER_AGENT, &self.config.user_agent)
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RedditError::Auth(format!("{} - {}", status, body)));
        }

        let body = response.bytes().await?;
        let parsed: AccessTokenResponse = serde_json::from_slice(&body)?;
        let Some(value) = parsed.access_token else {
            return Err(RedditError::Auth(
                parsed.error.unwrap_or_else(|| "missing access_token".to_string()),
            ));
        };

        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME));
        Ok(AccessToken {
            value,
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        })
    }
}
