use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::snapshot::{RoomListResponse, ScoreboardSnapshot},
    error::AppError,
    services::room_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/rooms",
    tag = "rooms",
    responses((status = 200, description = "Known rooms", body = RoomListResponse))
)]
/// List the rooms held in memory or persisted.
pub async fn list_rooms(State(state): State<SharedState>) -> Json<RoomListResponse> {
    Json(room_service::list_rooms(&state).await)
}

#[utoipa::path(
    get,
    path = "/rooms/{room}/state",
    tag = "rooms",
    params(("room" = String, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Current room snapshot", body = ScoreboardSnapshot),
        (status = 400, description = "Malformed room identifier"),
        (status = 404, description = "Room unknown"),
        (status = 503, description = "Snapshot store unavailable")
    )
)]
/// Return the current snapshot of a room.
pub async fn room_state(
    State(state): State<SharedState>,
    Path(room): Path<String>,
) -> Result<Json<ScoreboardSnapshot>, AppError> {
    let snapshot = room_service::room_state(&state, &room).await?;
    Ok(Json(snapshot))
}

/// Configure the read-only room routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/rooms", get(list_rooms))
        .route("/rooms/{room}/state", get(room_state))
}
