use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use gpupulse_core::Snapshot;

/// Holds the latest published snapshot and fans updates out to any
/// number of subscribers.
///
/// The latest-snapshot slot is swapped whole, never edited in place, so
/// readers can never observe a partially-updated snapshot. Fan-out goes
/// through a bounded broadcast channel: a subscriber that stops
/// draining its queue lags and skips ahead to newer snapshots, it never
/// delays `publish` or other subscribers.
pub struct SnapshotBroadcaster {
    latest: RwLock<Option<Arc<Snapshot>>>,
    tx: broadcast::Sender<Arc<Snapshot>>,
}

impl SnapshotBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            latest: RwLock::new(None),
            tx,
        }
    }

    /// Replace the held snapshot and wake subscribers.
    /// Zero subscribers is not an error.
    pub fn publish(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        *self.latest.write().unwrap() = Some(Arc::clone(&snapshot));
        let _ = self.tx.send(snapshot);
    }

    /// Most recent published snapshot; `None` before the first tick.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.read().unwrap().clone()
    }

    /// Register a consumer. Each receiver has its own bounded queue
    /// with drop-oldest-on-overflow semantics.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
