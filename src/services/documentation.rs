use utoipa::OpenApi;

#[derive(OpenApi)]
/// OpenAPI document of the scoreboard server.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::list_rooms,
        crate::routes::rooms::room_state,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::StorageStatus,
            crate::dto::snapshot::RoomListResponse,
            crate::dto::snapshot::ScoreboardSnapshot,
            crate::dto::ws::EventEnvelope,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Read-only access to room snapshots"),
        (name = "scoreboard", description = "WebSocket channel carrying operations and snapshots"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in ["/healthcheck", "/rooms", "/rooms/{room}/state", "/ws"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
