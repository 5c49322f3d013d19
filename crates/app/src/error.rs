use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdf_chat_core::{ErrorClass, PipelineError};
use serde::Serialize;

/// HTTP-facing wrapper around pipeline failures. Server-side errors are
/// logged in full but reach the caller sanitized; never a raw
/// collaborator error body.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        Self(error)
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0.class() {
            ErrorClass::NotFound => (StatusCode::NOT_FOUND, self.0.to_string()),
            ErrorClass::BadRequest => (StatusCode::BAD_REQUEST, self.0.to_string()),
            ErrorClass::ServerError => {
                tracing::error!(error = %self.0, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            status: "error",
        };
        (status, Json(body)).into_response()
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(PipelineError::InvalidInput(message.into()))
    }
}
