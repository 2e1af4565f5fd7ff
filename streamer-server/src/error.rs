//! HTTP error replies
//!
//! Every failure leaves the server as a JSON object with an `error` code:
//!
//! | Error | Status | Body |
//! |---|---|---|
//! | stale version | 409 | `{"error":"stale_version","current_version","submitted_version"}` |
//! | invalid payload | 422 | `{"error":"invalid_payload","field","message"}` |
//! | body too large | 413 | `{"error":"payload_too_large","message"}` |
//! | not found | 404 | `{"error":"not_found","message"}` |
//! | anything else | 500 | `{"error":"internal","message"}` |

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use core_library::{LibraryError, StaleVersionReply};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("stale library version: submitted {submitted}, current {current}")]
    Stale { submitted: u64, current: u64 },

    #[error("invalid payload: {field} - {message}")]
    InvalidPayload { field: String, message: String },

    #[error("payload too large: {0}")]
    TooLarge(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Stale { .. } => StatusCode::CONFLICT,
            ApiError::InvalidPayload { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LibraryError> for ApiError {
    fn from(err: LibraryError) -> Self {
        match err {
            LibraryError::StaleVersion { submitted, current } => ApiError::Stale { submitted, current },
            LibraryError::InvalidInput { field, message } => ApiError::InvalidPayload { field, message },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::TooLarge(rejection.body_text())
        } else {
            ApiError::InvalidPayload {
                field: "body".to_string(),
                message: rejection.body_text(),
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Stale { submitted, current } => {
                json!(StaleVersionReply::new(submitted, current))
            }
            ApiError::InvalidPayload { field, message } => json!({
                "error": "invalid_payload",
                "field": field,
                "message": message,
            }),
            ApiError::TooLarge(message) => json!({
                "error": "payload_too_large",
                "message": message,
            }),
            ApiError::NotFound(message) => json!({
                "error": "not_found",
                "message": message,
            }),
            ApiError::Internal(message) => {
                error!(error = %message, "Request failed");
                json!({
                    "error": "internal",
                    "message": message,
                })
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
