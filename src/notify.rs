use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Cache-invalidation notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Invalidation {
    /// Cell statuses were written; every derived cache is stale.
    StatusMapChanged,
    /// A private event was created, updated or deleted.
    PrivateEventChanged { date: Option<String> },
    /// Rules were registered, removed or toggled.
    RulesChanged,
}

/// Broadcast hub for invalidation events.
pub struct InvalidationHub {
    sender: broadcast::Sender<Invalidation>,
}

impl Default for InvalidationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationHub {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, event: Invalidation) {
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
