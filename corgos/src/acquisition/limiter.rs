//! Concurrency gates for the two backends.
//!
//! The feed listing API and raw image hosts are throttled independently:
//! each has its own semaphore, so a burst of image checks never holds back
//! a listing call and vice versa.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use crate::settings::LimiterConfig;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct FetchLimiter {
    listing: Arc<Semaphore>,
    http: Arc<Semaphore>,
}

impl FetchLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            listing: Arc::new(Semaphore::new(config.listing_permits.max(1))),
            http: Arc::new(Semaphore::new(config.http_permits.max(1))),
        }
    }

    /// Wait for a slot on the listing gate. The slot is released when the permit drops.
    pub async fn listing_permit(&self) -> Result<OwnedSemaphorePermit> {
        trace!(available = self.listing.available_permits(), "Acquiring listing permit");
        self.listing
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Other(format!("Semaphore error: {}", e)))
    }

    /// Wait for a slot on the HTTP gate.
    pub async fn http_permit(&self) -> Result<OwnedSemaphorePermit> {
        trace!(available = self.http.available_permits(), "Acquiring http permit");
        self.http
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Other(format!("Semaphore error: {}", e)))
    }

    pub fn available_listing_permits(&self) -> usize {
        self.listing.available_permits()
    }

    pub fn available_http_permits(&self) -> usize {
        self.http.available_permits()
    }
}
