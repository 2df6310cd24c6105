//! Storage change notifications
//!
//! A small broadcast bus the stores post to after successful writes.
//! Observers subscribe for UI refresh; nobody is required to listen.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageEvent {
    EngineOpened,
    BookmarksUpdated,
    HistoryUpdated,
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StorageEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Post an event. Having no subscribers is normal and not an error.
    pub fn post(&self, event: StorageEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!(?event, "Storage event had no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_posted_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.post(StorageEvent::BookmarksUpdated);
        assert_eq!(rx.recv().await.unwrap(), StorageEvent::BookmarksUpdated);
    }

    #[test]
    fn test_post_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.post(StorageEvent::EngineOpened);
    }
}
