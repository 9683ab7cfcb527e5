/// Per-room broadcast of snapshot frames.
pub mod hub;
/// One room: versioned state plus its subscribers.
pub mod room;
/// Round lifecycle.
pub mod rounds;
/// Scoreboard state and its events.
pub mod scoreboard;

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::{Notify, RwLock, watch};
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    dao::{models::SnapshotEntity, snapshot_store::SnapshotStore},
    state::{room::Room, scoreboard::ScoreboardState},
};

/// Handle shared by every handler and background task.
pub type SharedState = Arc<AppState>;

/// Room used when a client does not name one.
pub const DEFAULT_ROOM: &str = "default";

/// Central application state: the room registry and the snapshot store handle.
pub struct AppState {
    config: Arc<AppConfig>,
    rooms: DashMap<String, Arc<Room>>,
    snapshot_store: RwLock<Option<Arc<dyn SnapshotStore>>>,
    degraded: watch::Sender<bool>,
    dirty: DashSet<String>,
    persist_signal: Notify,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a snapshot store is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config: Arc::new(config),
            rooms: DashMap::new(),
            snapshot_store: RwLock::new(None),
            degraded: degraded_tx,
            dirty: DashSet::new(),
            persist_signal: Notify::new(),
        })
    }

    /// Shared runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Get a room, creating it on first access.
    ///
    /// A new room resumes from the snapshot store when one is installed and holds a
    /// snapshot for it; otherwise it starts from the configured defaults.
    pub async fn room(&self, id: &str) -> Arc<Room> {
        if let Some(room) = self.existing_room(id) {
            return room;
        }

        let persisted = self.load_persisted(id).await;
        let capacity = self.config.broadcast_capacity();
        let defaults = self.config.defaults();
        self.rooms
            .entry(id.to_string())
            .or_insert_with(|| {
                let room = match persisted {
                    Some(entity) => Room::from_entity(entity, capacity),
                    None => Room::new(id, ScoreboardState::new(defaults), capacity),
                };
                info!(room = %id, "room opened");
                Arc::new(room)
            })
            .clone()
    }

    /// Room already held in memory.
    pub fn existing_room(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.get(id).map(|entry| entry.value().clone())
    }

    /// Identifiers of the rooms held in memory, sorted.
    pub fn room_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rooms.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of rooms held in memory.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Live WebSocket subscribers across all rooms.
    pub fn client_count(&self) -> usize {
        self.rooms
            .iter()
            .map(|entry| entry.value().subscriber_count())
            .sum()
    }

    async fn load_persisted(&self, id: &str) -> Option<SnapshotEntity> {
        let store = self.snapshot_store().await?;
        match store.load(id).await {
            Ok(entity) => entity,
            Err(err) => {
                warn!(room = %id, error = %err, "failed to load room snapshot; starting fresh");
                None
            }
        }
    }

    /// Obtain a handle to the current snapshot store, if one is installed.
    pub async fn snapshot_store(&self) -> Option<Arc<dyn SnapshotStore>> {
        let guard = self.snapshot_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a snapshot store and leave degraded mode.
    ///
    /// Rooms opened while degraded and still untouched adopt their persisted snapshot;
    /// every room is then scheduled for a save so the store catches up.
    pub async fn install_snapshot_store(&self, store: Arc<dyn SnapshotStore>) {
        {
            let mut guard = self.snapshot_store.write().await;
            *guard = Some(store.clone());
        }
        self.update_degraded(false);

        for room in self.rooms.iter().map(|entry| entry.value().clone()).collect::<Vec<_>>() {
            match store.load(room.id()).await {
                Ok(Some(entity)) => {
                    if room.restore(entity).await {
                        info!(room = %room.id(), "room resumed from persisted snapshot");
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(room = %room.id(), error = %err, "failed to load room snapshot"),
            }
            self.mark_dirty(room.id());
        }
    }

    /// Remove the current snapshot store and enter degraded mode.
    pub async fn clear_snapshot_store(&self) {
        {
            let mut guard = self.snapshot_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.snapshot_store.read().await;
        guard.is_none() || *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub(crate) fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Schedule `room` for the next persistence flush.
    pub fn mark_dirty(&self, room: &str) {
        self.dirty.insert(room.to_string());
        self.persist_signal.notify_one();
    }

    /// Put `room` back in the dirty set without waking the persistence loop.
    ///
    /// Used after a failed save so the room is retried on the next flush.
    pub fn defer_dirty(&self, room: &str) {
        self.dirty.insert(room.to_string());
    }

    /// Drain the set of rooms waiting to be saved.
    pub fn take_dirty_rooms(&self) -> Vec<String> {
        self.take_dirty_handles()
            .iter()
            .map(|room| room.id().to_string())
            .collect()
    }

    /// Drain the set of rooms waiting to be saved, returning their handles.
    ///
    /// Each handle is cloned before its id leaves the set, so a room is always either
    /// dirty or referenced while a flush is under way and the idle sweep skips it.
    pub fn take_dirty_handles(&self) -> Vec<Arc<Room>> {
        let ids: Vec<String> = self.dirty.iter().map(|room| room.key().clone()).collect();
        let mut rooms = Vec::with_capacity(ids.len());
        for id in ids {
            let room = self.existing_room(&id);
            self.dirty.remove(&id);
            rooms.extend(room);
        }
        rooms
    }

    /// Drop `id` from memory when it is idle, see [`Self::evict_idle_rooms`].
    pub async fn evict_idle_room(&self, id: &str) -> bool {
        if self.snapshot_store().await.is_none() {
            return false;
        }
        let evicted = self
            .rooms
            .remove_if(id, |id, room| self.is_idle(id, room))
            .is_some();
        if evicted {
            info!(room = %id, "idle room evicted");
        }
        evicted
    }

    /// Drop every idle room from memory and return how many went.
    ///
    /// A room is idle when nothing outside the registry holds it (no socket, no flush
    /// in progress) and it has no unsaved changes. Nothing is evicted while no snapshot
    /// store is installed since memory is then the only copy. An evicted room comes
    /// back from its snapshot on next access.
    pub async fn evict_idle_rooms(&self) -> usize {
        if self.snapshot_store().await.is_none() {
            return 0;
        }
        let mut evicted = 0;
        self.rooms.retain(|id, room| {
            if self.is_idle(id, room) {
                info!(room = %id, "idle room evicted");
                evicted += 1;
                false
            } else {
                true
            }
        });
        evicted
    }

    // Runs under the registry shard lock, so no new handle can be cloned meanwhile.
    fn is_idle(&self, id: &str, room: &Arc<Room>) -> bool {
        Arc::strong_count(room) == 1 && room.subscriber_count() == 0 && !self.dirty.contains(id)
    }

    /// Wait until a room is marked dirty.
    pub async fn dirty_notified(&self) {
        self.persist_signal.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::snapshot_store::MemorySnapshotStore,
        state::scoreboard::{ScoreboardEvent, TeamKey},
    };

    fn rename(name: &str) -> ScoreboardEvent {
        ScoreboardEvent::UpdateTeam {
            team: TeamKey::Team2,
            name: Some(name.into()),
            color: None,
        }
    }

    #[tokio::test]
    async fn rooms_are_independent() {
        let state = AppState::new(AppConfig::default());
        let a = state.room("a").await;
        let b = state.room("b").await;
        a.apply(rename("Rouge")).await.unwrap();

        assert_eq!(a.snapshot().await.team2.name, "Rouge");
        assert_ne!(b.snapshot().await.team2.name, "Rouge");
        assert!(Arc::ptr_eq(&a, &state.room("a").await));
        assert_eq!(state.room_ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn new_rooms_resume_from_the_store() {
        let state = AppState::new(AppConfig::default());
        let store = MemorySnapshotStore::new();
        let seed = Room::new("salle", ScoreboardState::new(state.config().defaults()), 4);
        seed.apply(rename("Persisted")).await.unwrap();
        store.insert(seed.to_entity().await);

        state.install_snapshot_store(Arc::new(store)).await;
        assert!(!state.is_degraded().await);

        let room = state.room("salle").await;
        let snapshot = room.snapshot().await;
        assert_eq!(snapshot.team2.name, "Persisted");
        assert_eq!(snapshot.version, 1);
    }

    #[tokio::test]
    async fn rooms_opened_while_degraded_adopt_snapshot_on_install() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded().await);
        let room = state.room("salle").await;

        let store = MemorySnapshotStore::new();
        let seed = Room::new("salle", ScoreboardState::new(state.config().defaults()), 4);
        seed.apply(rename("Late")).await.unwrap();
        store.insert(seed.to_entity().await);

        state.install_snapshot_store(Arc::new(store)).await;
        assert_eq!(room.snapshot().await.team2.name, "Late");
        assert_eq!(state.take_dirty_rooms(), vec!["salle".to_string()]);
        assert!(state.take_dirty_rooms().is_empty());
    }

    #[tokio::test]
    async fn idle_rooms_are_evicted_once_saved_and_come_back_from_the_store() {
        let state = AppState::new(AppConfig::default());
        let store = MemorySnapshotStore::new();
        state.install_snapshot_store(Arc::new(store.clone())).await;

        for id in ["a", "b", "c"] {
            let room = state.room(id).await;
            room.apply(rename(id)).await.unwrap();
            state.mark_dirty(id);
        }
        assert_eq!(state.evict_idle_rooms().await, 0);

        crate::services::persistence::flush(&state).await;
        assert_eq!(state.evict_idle_rooms().await, 3);
        assert_eq!(state.room_count(), 0);

        let room = state.room("b").await;
        let snapshot = room.snapshot().await;
        assert_eq!(snapshot.team2.name, "b");
        assert_eq!(snapshot.version, 1);
    }

    #[tokio::test]
    async fn rooms_in_use_or_without_a_store_are_kept() {
        let state = AppState::new(AppConfig::default());
        drop(state.room("memory-only").await);
        assert!(!state.evict_idle_room("memory-only").await);

        state
            .install_snapshot_store(Arc::new(MemorySnapshotStore::new()))
            .await;
        state.take_dirty_rooms();

        let held = state.room("held").await;
        assert!(!state.evict_idle_room("held").await);
        drop(held);
        assert!(state.evict_idle_room("held").await);
        assert!(state.evict_idle_room("memory-only").await);
        assert_eq!(state.room_count(), 0);
    }
}
