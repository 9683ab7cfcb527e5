use axum::Router;

use crate::state::SharedState;

/// Swagger UI and the OpenAPI document.
pub mod docs;
/// `/healthcheck`.
pub mod health;
/// Read-only room endpoints.
pub mod rooms;
/// `/ws` upgrade.
pub mod websocket;

/// Compose the health, room, WebSocket and documentation routes over one shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(rooms::router())
        .merge(websocket::router())
        .merge(docs::router())
        .with_state(state)
}
