//! Read-only room queries behind the REST routes.

use std::collections::BTreeSet;

use tracing::warn;

use crate::{
    dto::{
        snapshot::{RoomListResponse, ScoreboardSnapshot},
        validation::validate_room_id,
    },
    error::ServiceError,
    state::SharedState,
};

/// List rooms held in memory merged with those the snapshot store knows about.
pub async fn list_rooms(state: &SharedState) -> RoomListResponse {
    let mut rooms: BTreeSet<String> = state.room_ids().into_iter().collect();
    let mut complete = true;

    match state.snapshot_store().await {
        Some(store) => match store.list_rooms().await {
            Ok(persisted) => rooms.extend(persisted),
            Err(err) => {
                warn!(error = %err, "failed to list persisted rooms");
                complete = false;
            }
        },
        None => complete = false,
    }

    RoomListResponse {
        rooms: rooms.into_iter().collect(),
        complete,
    }
}

/// Current snapshot of `room_id`.
///
/// Rooms that are neither in memory nor persisted are reported as missing. Persisted
/// rooms are read straight from the store, so polling this route never provisions rooms.
pub async fn room_state(
    state: &SharedState,
    room_id: &str,
) -> Result<ScoreboardSnapshot, ServiceError> {
    validate_room_id(room_id)
        .map_err(|_| ServiceError::InvalidRoom(room_id.to_string()))?;

    if let Some(room) = state.existing_room(room_id) {
        return Ok(room.snapshot().await);
    }

    if let Some(store) = state.snapshot_store().await {
        if let Some(entity) = store.load(room_id).await? {
            return Ok(ScoreboardSnapshot::from_state(
                &entity.room,
                entity.version,
                &entity.state,
            ));
        }
    }

    Err(ServiceError::RoomNotFound(room_id.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::snapshot_store::MemorySnapshotStore,
        state::{AppState, room::Room, scoreboard::ScoreboardState},
    };

    #[tokio::test]
    async fn listing_merges_memory_and_store() {
        let state = AppState::new(AppConfig::default());
        state.room("live").await;
        assert_eq!(
            list_rooms(&state).await,
            RoomListResponse {
                rooms: vec!["live".into()],
                complete: false,
            }
        );

        let store = MemorySnapshotStore::new();
        let archived = Room::new("archived", ScoreboardState::new(state.config().defaults()), 4);
        store.insert(archived.to_entity().await);
        state.install_snapshot_store(Arc::new(store)).await;

        let listing = list_rooms(&state).await;
        assert_eq!(listing.rooms, vec!["archived".to_string(), "live".to_string()]);
        assert!(listing.complete);
    }

    #[tokio::test]
    async fn unknown_rooms_are_not_created() {
        let state = AppState::new(AppConfig::default());
        assert!(matches!(
            room_state(&state, "ghost").await,
            Err(ServiceError::RoomNotFound(_))
        ));
        assert!(matches!(
            room_state(&state, "bad room!").await,
            Err(ServiceError::InvalidRoom(_))
        ));
        assert_eq!(state.room_count(), 0);

        state.room("ghost").await;
        assert_eq!(room_state(&state, "ghost").await.unwrap().room, "ghost");
    }

    #[tokio::test]
    async fn persisted_rooms_are_read_without_being_opened() {
        let state = AppState::new(AppConfig::default());
        let store = MemorySnapshotStore::new();
        let archived = Room::new("archived", ScoreboardState::new(state.config().defaults()), 4);
        store.insert(archived.to_entity().await);
        state.install_snapshot_store(Arc::new(store)).await;

        let snapshot = room_state(&state, "archived").await.unwrap();
        assert_eq!(snapshot.room, "archived");
        assert_eq!(state.room_count(), 0);
    }
}
