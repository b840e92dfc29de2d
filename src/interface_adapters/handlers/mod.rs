use axum::http::StatusCode;
use axum::Json;

use crate::interface_adapters::protocol::ErrorResponse;

pub mod auth;
pub mod credits;
pub mod files;
pub mod google;
pub mod style;
pub mod webhook;

pub(crate) fn error_response(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}
