use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Failures of the room queries behind the REST routes.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The snapshot store could not answer.
    #[error("snapshot store failed")]
    Storage(#[from] StorageError),
    /// Room ids are 1 to 64 characters of `[A-Za-z0-9_-]`.
    #[error("invalid room id `{0}`")]
    InvalidRoom(String),
    /// The room is neither in memory nor persisted.
    #[error("room `{0}` not found")]
    RoomNotFound(String),
}

/// Errors rendered as JSON HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// 400 with the given message.
    #[error("{0}")]
    BadRequest(String),
    /// 404 with the given message.
    #[error("{0}")]
    NotFound(String),
    /// 503 with the given message.
    #[error("{0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Storage(source) => AppError::ServiceUnavailable(source.to_string()),
            err @ ServiceError::InvalidRoom(_) => AppError::BadRequest(err.to_string()),
            err @ ServiceError::RoomNotFound(_) => AppError::NotFound(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match &self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        };

        let body = Json(ErrorBody {
            error,
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}
