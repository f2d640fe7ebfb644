//! API response envelope.
//!
//! Every endpoint answers with the same JSON shape: a numeric result
//! code, a human-readable message, and an optional data payload. The
//! HTTP status mirrors the code so plain HTTP clients behave sensibly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::error::Error;

/// Result code for a successful call.
pub const CODE_OK: u32 = 0;
/// The API token is missing, unknown, disabled, or expired.
pub const CODE_INVALID_TOKEN: u32 = 1001;
/// The request parameters are malformed or incomplete.
pub const CODE_PARAMETER_ERROR: u32 = 1002;
/// Reserved: unknown channel id. No longer emitted; unknown channel ids
/// are dropped from the selection instead.
pub const CODE_UNKNOWN_CHANNEL: u32 = 1003;
/// Reserved: unknown AI channel id. Same treatment as unknown channels.
pub const CODE_UNKNOWN_AI: u32 = 1004;
/// The push could not be accepted or delivered.
pub const CODE_SEND_FAILED: u32 = 1005;
/// The requested message does not exist (or belongs to another token).
pub const CODE_MESSAGE_NOT_FOUND: u32 = 1006;

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            code: CODE_OK,
            message: "success".to_string(),
            data: Some(json!(data)),
        }
    }

    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    fn http_status(&self) -> StatusCode {
        match self.code {
            CODE_OK => StatusCode::OK,
            CODE_INVALID_TOKEN => StatusCode::UNAUTHORIZED,
            CODE_PARAMETER_ERROR => StatusCode::BAD_REQUEST,
            CODE_MESSAGE_NOT_FOUND => StatusCode::NOT_FOUND,
            CODE_SEND_FAILED => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.http_status(), Json(self)).into_response()
    }
}

impl From<&Error> for ApiResponse {
    fn from(err: &Error) -> Self {
        match err {
            Error::Dispatch(e) => ApiResponse::error(e.api_code(), e.to_string()),
            // Internal failures surface as a send failure without detail.
            other => {
                tracing::error!(error = %other, "Request failed internally");
                ApiResponse::error(CODE_SEND_FAILED, "internal error")
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        ApiResponse::from(&self).into_response()
    }
}
