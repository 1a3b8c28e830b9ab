use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use gpupulse_collector::SnapshotBroadcaster;
use gpupulse_core::{Device, Snapshot};

use crate::protocol::Inventory;

pub struct ClientInfo {
    pub connected_at: Instant,
}

/// Shared server state: the immutable device inventory, the snapshot
/// broadcaster, and the set of connected dashboard clients.
pub struct AppState {
    devices: Vec<Device>,
    driver_version: Option<String>,
    poll_interval_ms: u64,
    pub broadcaster: Arc<SnapshotBroadcaster>,
    clients: DashMap<Uuid, ClientInfo>,
}

impl AppState {
    pub fn new(
        devices: Vec<Device>,
        driver_version: Option<String>,
        poll_interval_ms: u64,
        broadcaster: Arc<SnapshotBroadcaster>,
    ) -> Self {
        Self {
            devices,
            driver_version,
            poll_interval_ms,
            broadcaster,
            clients: DashMap::new(),
        }
    }

    pub fn inventory(&self) -> Inventory<'_> {
        Inventory {
            devices: &self.devices,
            driver_version: self.driver_version.as_deref(),
            poll_interval_ms: self.poll_interval_ms,
        }
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.broadcaster.latest()
    }

    pub fn register_client(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.clients.insert(
            id,
            ClientInfo {
                connected_at: Instant::now(),
            },
        );
        id
    }

    /// Returns how long the client was connected, if it was known.
    pub fn unregister_client(&self, id: &Uuid) -> Option<Duration> {
        self.clients
            .remove(id)
            .map(|(_, info)| info.connected_at.elapsed())
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
