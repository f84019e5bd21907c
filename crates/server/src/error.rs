use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pipeline::{CmsError, SitegenError};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

/// Failures a handler reports as a JSON `{ "error": ... }` body.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    /// CMS settings or required variables are missing.
    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Cms(#[from] CmsError),

    #[error(transparent)]
    Pipeline(#[from] SitegenError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Cms(_) => StatusCode::BAD_GATEWAY,
            ServerError::Pipeline(SitegenError::UnknownAgent(_)) => StatusCode::NOT_FOUND,
            ServerError::Pipeline(SitegenError::MissingEnvironment { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServerError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(%status, error = %self, "Request failed");
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
