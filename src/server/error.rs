//! API error taxonomy mapped onto HTTP status codes

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced to HTTP clients. The dispatcher is the only place that
/// turns internal failures into status codes, and a bad secret never leaks
/// detail beyond "rejected".
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rejected")]
    Auth,

    #[error("{0}")]
    Validation(String),

    #[error("unknown command")]
    UnknownTask,

    #[error("failed command")]
    Execution,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth => StatusCode::FORBIDDEN,
            ApiError::Validation(_) | ApiError::UnknownTask => StatusCode::BAD_REQUEST,
            ApiError::Execution => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
