use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tracing::debug;
use utoipa::IntoParams;

use crate::{
    dto::validation::validate_room_id,
    error::{AppError, ServiceError},
    services::websocket_service,
    state::{DEFAULT_ROOM, SharedState},
};

/// Query string accepted by the WebSocket endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WsParams {
    /// Room to join; defaults to `default`.
    pub room: Option<String>,
    /// Opaque client token. Accepted for forward compatibility and not checked.
    pub token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws",
    tag = "scoreboard",
    params(WsParams),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 400, description = "Malformed room identifier")
    )
)]
/// Upgrade the HTTP connection into a scoreboard session bound to one room.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let room = params
        .room
        .filter(|room| !room.is_empty())
        .unwrap_or_else(|| DEFAULT_ROOM.to_string());
    validate_room_id(&room).map_err(|_| AppError::from(ServiceError::InvalidRoom(room.clone())))?;
    debug!(room = %room, token = params.token.is_some(), "websocket upgrade requested");

    let shared_state = state.clone();
    Ok(ws.on_upgrade(move |socket| websocket_service::handle_socket(shared_state, socket, room)))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
