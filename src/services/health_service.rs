use tracing::warn;

use crate::{
    dto::health::{HealthResponse, StorageStatus},
    state::SharedState,
};

/// Probe the snapshot store and summarize the server's load.
///
/// A failed probe is only logged here; the storage supervisor owns the degraded flag.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.snapshot_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "snapshot store health check failed");
            }
        }
        None => warn!("no snapshot store installed (degraded mode)"),
    }

    let status = if state.is_degraded().await {
        StorageStatus::Degraded
    } else {
        StorageStatus::Ok
    };

    HealthResponse {
        status,
        rooms: state.room_count(),
        clients: state.client_count(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::snapshot_store::MemorySnapshotStore, state::AppState};

    #[tokio::test]
    async fn degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        let room = state.room("default").await;
        let _viewer = room.subscribe().await;

        let status = health_status(&state).await;
        assert_eq!(status.status, StorageStatus::Degraded);
        assert_eq!(status.rooms, 1);
        assert_eq!(status.clients, 1);

        state
            .install_snapshot_store(Arc::new(MemorySnapshotStore::new()))
            .await;
        assert_eq!(health_status(&state).await.status, StorageStatus::Ok);
    }
}
