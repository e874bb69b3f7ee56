//! The `{code, data, message}` envelope and request/response bodies for the
//! server API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

/// Uniform response envelope. `code` is an HTTP-status-shaped integer so a
/// client that only looks at the JSON body (not the transport status line)
/// still gets the right answer.
#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T: Serialize> {
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub message: String,
}

impl<T: Serialize> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self { code: 200, data: Some(data), message: "ok".to_string() }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self { code: 200, data: Some(data), message: message.into() }
    }

    pub fn error(code: StatusCode, message: impl Into<String>) -> Self {
        Self { code: code.as_u16(), data: None, message: message.into() }
    }
}

impl<T: Serialize> IntoResponse for ApiEnvelope<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// `POST /download` request body.
#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default)]
    pub filename: Option<String>,
    /// When true, the response waits for completion and streams the file
    /// back instead of returning a job id. Open question resolved in
    /// DESIGN.md: unset/false is the default, matching fire-and-poll.
    #[serde(default)]
    pub return_file: Option<bool>,
}
