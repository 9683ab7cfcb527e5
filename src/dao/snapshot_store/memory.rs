use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{models::SnapshotEntity, snapshot_store::SnapshotStore, storage::StorageResult};

/// Process-local store, used by tests and when persistence is not wanted.
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    snapshots: Arc<DashMap<String, SnapshotEntity>>,
}

impl MemorySnapshotStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a room, e.g. to simulate a previous run.
    pub fn insert(&self, snapshot: SnapshotEntity) {
        self.snapshots.insert(snapshot.room.clone(), snapshot);
    }

    /// Last snapshot saved for `room`.
    pub fn get(&self, room: &str) -> Option<SnapshotEntity> {
        self.snapshots.get(room).map(|entry| entry.value().clone())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, room: &str) -> BoxFuture<'static, StorageResult<Option<SnapshotEntity>>> {
        let snapshot = self.get(room);
        Box::pin(async move { Ok(snapshot) })
    }

    fn save(&self, snapshot: SnapshotEntity) -> BoxFuture<'static, StorageResult<()>> {
        let snapshots = self.snapshots.clone();
        Box::pin(async move {
            // Latest version wins even if saves complete out of order.
            snapshots
                .entry(snapshot.room.clone())
                .and_modify(|existing| {
                    if snapshot.version >= existing.version {
                        *existing = snapshot.clone();
                    }
                })
                .or_insert_with(|| snapshot.clone());
            Ok(())
        })
    }

    fn list_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let mut rooms: Vec<String> = self.snapshots.iter().map(|e| e.key().clone()).collect();
        rooms.sort();
        Box::pin(async move { Ok(rooms) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
