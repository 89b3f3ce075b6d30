//! API error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use forge_core::ForgeError;
use serde_json::json;

/// An error rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    /// 400 Bad Request
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// 404 Not Found
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// 500 Internal Server Error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<ForgeError> for ApiError {
    fn from(error: ForgeError) -> Self {
        let status = match &error {
            ForgeError::Configuration { .. } | ForgeError::Validation { .. } => {
                StatusCode::BAD_REQUEST
            }
            ForgeError::Provider { .. } | ForgeError::ChainExhausted { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ForgeError::Store { .. } | ForgeError::Queue { .. } | ForgeError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": { "message": self.message },
        }));
        (self.status, body).into_response()
    }
}
