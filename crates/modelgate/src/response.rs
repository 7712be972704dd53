//! JSON error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use modelgate_protocol::ErrorBody;

use crate::chat::ChatError;

/// Response for a turn that failed before streaming started.
pub fn chat_error(err: &ChatError) -> Response {
    let body = err.to_body();
    let status =
        StatusCode::from_u16(body.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

pub fn bad_request(message: impl Into<String>) -> Response {
    error(StatusCode::BAD_REQUEST, message, false)
}

fn error(status: StatusCode, message: impl Into<String>, is_retryable: bool) -> Response {
    let body = ErrorBody {
        error: true,
        message: message.into(),
        status_code: status.as_u16(),
        is_retryable,
        provider: "unknown".to_string(),
        context_error: None,
    };
    (status, Json(body)).into_response()
}
