//! Change notification for presence sets.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::compute::InvalidationScope;
use crate::entry::PresenceEntry;

/// Default buffer size for the broadcast channel.
const DEFAULT_BUFFER_SIZE: usize = 256;

/// Receives a context's new snapshot after every successful mutation.
///
/// `scope` is active for the duration of the call. Implementations that
/// mutate the registry in response must pass it along so the nested change
/// is not propagated again.
#[async_trait]
pub trait PresenceNotifier: Send + Sync {
    async fn presence_changed(
        &self,
        context: &str,
        snapshot: Arc<Vec<PresenceEntry>>,
        scope: InvalidationScope,
    );
}

/// A context's membership after a change.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceChange {
    pub context: String,
    pub members: Arc<Vec<PresenceEntry>>,
}

/// Fans presence changes out to any number of subscribers.
///
/// Slow subscribers lose the oldest changes once the buffer is full.
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<PresenceChange>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceChange> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BroadcastNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastNotifier")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[async_trait]
impl PresenceNotifier for BroadcastNotifier {
    async fn presence_changed(
        &self,
        context: &str,
        snapshot: Arc<Vec<PresenceEntry>>,
        _scope: InvalidationScope,
    ) {
        // No subscribers is not an error.
        let _ = self.sender.send(PresenceChange {
            context: context.to_string(),
            members: snapshot,
        });
    }
}
