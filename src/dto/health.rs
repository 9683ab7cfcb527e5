use serde::Serialize;
use utoipa::ToSchema;

/// Whether room snapshots are currently being persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StorageStatus {
    /// A snapshot store is installed and answering.
    Ok,
    /// Rooms are served from memory only.
    Degraded,
}

/// Body of `GET /healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether snapshots are currently being persisted.
    pub status: StorageStatus,
    /// Rooms held in memory.
    pub rooms: usize,
    /// Connected WebSocket clients across all rooms.
    pub clients: usize,
}
