use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error};

use crate::{
    dao::models::SnapshotEntity,
    dto::{
        now_rfc3339,
        snapshot::ScoreboardSnapshot,
        ws::{EVENT_UPDATE_STATE, ServerEvent},
    },
    state::{
        hub::SnapshotHub,
        rounds::Rejection,
        scoreboard::{ScoreboardEvent, ScoreboardState},
    },
};

/// Result of applying an event to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The state changed and the new snapshot was broadcast with this version.
    Changed(u64),
    /// The event was valid but left the state as it was; nothing was broadcast.
    Unchanged,
}

struct VersionedState {
    version: u64,
    state: Arc<ScoreboardState>,
}

/// One scoreboard: the authoritative state, its version counter and its subscribers.
///
/// Mutations are serialized by the write lock and broadcast before it is released, so
/// every subscriber observes snapshots in mutation order.
pub struct Room {
    id: String,
    inner: RwLock<VersionedState>,
    hub: SnapshotHub,
}

impl Room {
    /// Fresh room at version 0.
    pub fn new(id: impl Into<String>, state: ScoreboardState, capacity: usize) -> Self {
        Self {
            id: id.into(),
            inner: RwLock::new(VersionedState {
                version: 0,
                state: Arc::new(state),
            }),
            hub: SnapshotHub::new(capacity),
        }
    }

    /// Room resumed from a persisted snapshot.
    pub fn from_entity(entity: SnapshotEntity, capacity: usize) -> Self {
        Self {
            id: entity.room,
            inner: RwLock::new(VersionedState {
                version: entity.version,
                state: Arc::new(entity.state),
            }),
            hub: SnapshotHub::new(capacity),
        }
    }

    /// Room identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Apply `event` under the write lock and broadcast the result if anything changed.
    pub async fn apply(&self, event: ScoreboardEvent) -> Result<Applied, Rejection> {
        let mut guard = self.inner.write().await;
        let next = guard.state.apply(event)?;
        if next == *guard.state {
            return Ok(Applied::Unchanged);
        }

        guard.version += 1;
        guard.state = Arc::new(next);
        self.broadcast_locked(&guard);
        Ok(Applied::Changed(guard.version))
    }

    /// Adopt a persisted snapshot if the room has not been mutated yet.
    ///
    /// Returns whether the snapshot was adopted.
    pub async fn restore(&self, entity: SnapshotEntity) -> bool {
        let mut guard = self.inner.write().await;
        if guard.version != 0 || entity.version == 0 {
            return false;
        }
        guard.version = entity.version;
        guard.state = Arc::new(entity.state);
        self.broadcast_locked(&guard);
        true
    }

    /// Current snapshot frame plus a receiver for every later one.
    ///
    /// Both are taken under the same read guard so no mutation falls between them.
    pub async fn subscribe(
        &self,
    ) -> Result<(ServerEvent, broadcast::Receiver<ServerEvent>), serde_json::Error> {
        let guard = self.inner.read().await;
        let event = self.event_for(&guard)?;
        Ok((event, self.hub.subscribe()))
    }

    /// Current snapshot frame.
    pub async fn current_event(&self) -> Result<ServerEvent, serde_json::Error> {
        let guard = self.inner.read().await;
        self.event_for(&guard)
    }

    /// Current snapshot in its wire shape.
    pub async fn snapshot(&self) -> ScoreboardSnapshot {
        let guard = self.inner.read().await;
        ScoreboardSnapshot::from_state(&self.id, guard.version, &guard.state)
    }

    /// Current version and a shared handle on the state.
    pub async fn state(&self) -> (u64, Arc<ScoreboardState>) {
        let guard = self.inner.read().await;
        (guard.version, guard.state.clone())
    }

    /// Persistable form of the current state.
    pub async fn to_entity(&self) -> SnapshotEntity {
        let (version, state) = self.state().await;
        SnapshotEntity {
            room: self.id.clone(),
            version,
            saved_at: now_rfc3339(),
            state: ScoreboardState::clone(&state),
        }
    }

    fn event_for(&self, versioned: &VersionedState) -> Result<ServerEvent, serde_json::Error> {
        let snapshot = ScoreboardSnapshot::from_state(&self.id, versioned.version, &versioned.state);
        ServerEvent::json(EVENT_UPDATE_STATE, versioned.version, &snapshot)
    }

    fn broadcast_locked(&self, versioned: &VersionedState) {
        match self.event_for(versioned) {
            Ok(event) => {
                debug!(
                    room = %self.id,
                    version = versioned.version,
                    subscribers = self.hub.subscriber_count(),
                    "broadcasting snapshot"
                );
                self.hub.broadcast(event);
            }
            Err(err) => {
                error!(room = %self.id, error = %err, "failed to serialize snapshot");
            }
        }
    }
}
