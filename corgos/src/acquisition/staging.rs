use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

/// URLs accepted during one acquisition pass.
///
/// Has its own lock, separate from the serving queue, so validation tasks
/// never contend with readers of the live queue. Set semantics deduplicate.
#[derive(Debug, Clone, Default)]
pub struct StagingSet {
    urls: Arc<Mutex<HashSet<String>>>,
}

impl StagingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `urls`, returning how many were not present yet.
    pub async fn insert_all<I>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut set = self.urls.lock().await;
        urls.into_iter().filter(|url| set.insert(url.clone())).count()
    }

    pub async fn len(&self) -> usize {
        self.urls.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.urls.lock().await.is_empty()
    }

    /// Move the accumulated URLs out, leaving the set empty.
    pub async fn take(&self) -> HashSet<String> {
        std::mem::take(&mut *self.urls.lock().await)
    }
}
