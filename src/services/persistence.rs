use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::state::SharedState;

/// Save dirty rooms in the background.
///
/// Each wake-up waits for the configured debounce window so a burst of operations on a
/// room produces a single write holding the latest version.
pub async fn run(state: SharedState) {
    let debounce = state.config().persist_debounce();
    loop {
        state.dirty_notified().await;
        sleep(debounce).await;
        flush(&state).await;
        state.evict_idle_rooms().await;
    }
}

/// Write every dirty room to the snapshot store and return how many were saved.
///
/// Rooms stay dirty while no store is installed or when the store is unavailable;
/// they are retried on the next flush.
pub async fn flush(state: &SharedState) -> usize {
    let Some(store) = state.snapshot_store().await else {
        debug!("no snapshot store installed; postponing persistence");
        return 0;
    };

    let mut saved = 0;
    for room in state.take_dirty_handles() {
        let room_id = room.id();
        let entity = room.to_entity().await;
        let version = entity.version;
        match store.save(entity).await {
            Ok(()) => {
                debug!(room = %room_id, version, "room snapshot saved");
                saved += 1;
            }
            Err(err) if err.is_retryable() => {
                warn!(room = %room_id, version, error = %err, "failed to save room snapshot; will retry");
                state.defer_dirty(room_id);
            }
            Err(err) => {
                error!(room = %room_id, version, error = %err, "room snapshot rejected by the store");
            }
        }
    }

    if saved > 0 {
        info!(saved, "persisted room snapshots");
    }
    saved
}
