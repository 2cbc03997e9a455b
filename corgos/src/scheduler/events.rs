//! Refresh lifecycle events for front ends that notify administrators.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshEvent {
    /// An acquisition pass started.
    Started,
    /// The pass finished and the serving queue now holds `loaded` URLs.
    Completed { loaded: usize },
    /// The pass failed or was cancelled; the serving queue is unchanged.
    Failed { reason: String },
}

/// Broadcaster for refresh events.
#[derive(Debug, Clone)]
pub struct RefreshEventBroadcaster {
    sender: broadcast::Sender<RefreshEvent>,
}

impl RefreshEventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn publish(&self, event: RefreshEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RefreshEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
