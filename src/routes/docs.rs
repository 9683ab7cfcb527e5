use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Path the generated OpenAPI document is served from.
pub const OPENAPI_PATH: &str = "/api-doc/openapi.json";

/// Swagger UI at `/docs`, backed by the document at [`OPENAPI_PATH`].
pub fn router() -> Router<SharedState> {
    Router::new().merge(SwaggerUi::new("/docs").url(OPENAPI_PATH, ApiDoc::openapi()))
}
