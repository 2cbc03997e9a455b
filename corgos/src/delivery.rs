//! Entry points for the chat front end.

use std::sync::Arc;

use tracing::{debug, info};

use crate::queue::ServingQueue;
use crate::scheduler::RefreshScheduler;
use crate::{Error, Result};

/// Outcome of asking for the next image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Image(String),
    /// The queue was empty and a refresh has just been started.
    RefreshStarted,
    /// The queue was empty and a refresh is already running.
    RefreshPending,
}

pub struct DeliveryService {
    queue: Arc<ServingQueue>,
    scheduler: Arc<RefreshScheduler>,
}

impl DeliveryService {
    pub fn new(queue: Arc<ServingQueue>, scheduler: Arc<RefreshScheduler>) -> Self {
        Self { queue, scheduler }
    }

    /// Take the next image, starting a refresh if the queue is empty.
    pub async fn next_image(&self) -> Result<Delivery> {
        match self.queue.take_next().await {
            Ok(url) => Ok(Delivery::Image(url)),
            Err(Error::EmptyQueue) => {
                if self.scheduler.trigger_now() {
                    info!("Serving queue empty, refresh started");
                    Ok(Delivery::RefreshStarted)
                } else {
                    debug!("Serving queue empty, refresh already running");
                    Ok(Delivery::RefreshPending)
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Drop an image that could not be delivered. Returns whether it was queued.
    pub async fn report_broken(&self, url: &str) -> bool {
        let removed = self.queue.remove(url).await;
        if removed {
            info!(url = %url, "Removed undeliverable image");
        }
        removed
    }

    pub async fn queue_size(&self) -> usize {
        self.queue.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.is_empty().await
    }

    pub fn is_loading(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Start a refresh unless one is running. Returns whether one was started.
    pub fn trigger_refresh(&self) -> bool {
        self.scheduler.trigger_now()
    }
}
