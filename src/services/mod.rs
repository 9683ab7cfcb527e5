/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Debounced background persistence of room snapshots.
pub mod persistence;
/// Read-only room queries.
pub mod room_service;
/// Operation decoding and application.
pub mod scoreboard_service;
/// Snapshot store connection supervisor.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
