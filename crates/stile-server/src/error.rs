//! Server error wrapper.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Wrapper turning engine errors into HTTP responses.
#[derive(Debug)]
pub struct ServerError(pub stile_core::Error);

impl From<stile_core::Error> for ServerError {
    fn from(err: stile_core::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.0 {
            stile_core::Error::AccessDenied { status } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::FORBIDDEN),
                "ACCESS_DENIED",
                self.0.to_string(),
            ),
            stile_core::Error::InvalidNode { .. } | stile_core::Error::UnknownNodeType(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DEFINITION_ERROR",
                self.0.to_string(),
            ),
            stile_core::Error::DuplicateRoute(_)
            | stile_core::Error::RegistryDuplicate(_)
            | stile_core::Error::RegistryValidation(_)
            | stile_core::Error::Registration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "REGISTRATION_ERROR",
                self.0.to_string(),
            ),
            stile_core::Error::Evaluation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "EVALUATION_ERROR",
                self.0.to_string(),
            ),
            stile_core::Error::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                self.0.to_string(),
            ),
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for server handlers.
pub type ServerResult<T> = Result<T, ServerError>;
