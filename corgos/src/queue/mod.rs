//! The live, rotating queue of image URLs handed to consumers.

use std::collections::VecDeque;

use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Error, Result};

/// Ordered, rotating sequence of ready-to-serve image URLs.
///
/// Taking an image moves it from the front to the back, so a queue of `n`
/// items serves each of them once per `n` takes. A refresh replaces the
/// whole content in a single step under the same lock readers use.
#[derive(Debug, Default)]
pub struct ServingQueue {
    items: Mutex<VecDeque<String>>,
}

impl ServingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue with a fixed initial order. Used to seed the queue
    /// without shuffling.
    pub fn with_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            items: Mutex::new(items.into_iter().collect()),
        }
    }

    /// Return the front URL and rotate it to the back.
    pub async fn take_next(&self) -> Result<String> {
        let mut items = self.items.lock().await;
        let url = items.pop_front().ok_or(Error::EmptyQueue)?;
        items.push_back(url.clone());
        Ok(url)
    }

    /// Remove the first occurrence of `url`. Returns whether it was present.
    pub async fn remove(&self, url: &str) -> bool {
        let mut items = self.items.lock().await;
        match items.iter().position(|item| item == url) {
            Some(index) => {
                items.remove(index);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Copy of the current order, front first.
    pub async fn snapshot(&self) -> Vec<String> {
        self.items.lock().await.iter().cloned().collect()
    }

    /// Replace the whole content with a shuffled copy of `urls`.
    ///
    /// The new order is prepared before the lock is taken; readers observe
    /// either the previous content or the new one, never a mix.
    pub async fn swap<I>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut fresh: Vec<String> = urls.into_iter().collect();
        fresh.shuffle(&mut rand::rng());
        let count = fresh.len();

        let mut items = self.items.lock().await;
        *items = VecDeque::from(fresh);
        debug!(count, "Serving queue replaced");
        count
    }
}
