use crate::core::ProvisionerError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum ApiError {
    Input(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<ProvisionerError> for ApiError {
    fn from(err: ProvisionerError) -> Self {
        match err {
            ProvisionerError::NotFound(message) => Self::NotFound(format!("{message} not found")),
            ProvisionerError::Conflict(message) => Self::Conflict(message),
            ProvisionerError::InvalidInput(message) => Self::Input(message),
            err => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            ApiError::Input(msg) => (StatusCode::BAD_REQUEST, msg, "input_error"),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "not_found"),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, "conflict"),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg, "internal_error")
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
