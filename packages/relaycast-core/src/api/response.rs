//! HTTP response helper functions for consistent API responses.
//!
//! Successful bodies use the same `{ success, data }` envelope the
//! directory API speaks; errors go through
//! [`RelaycastError`](crate::error::RelaycastError)'s `IntoResponse`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

/// Standard API success response wrapping `data`.
pub fn api_success<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "success": true, "data": data })))
}

/// Simple success response with `{ "success": true }`.
pub fn api_ok() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "success": true })))
}

/// Standard API error response with code and message.
pub fn api_error(
    status: StatusCode,
    code: &str,
    message: impl std::fmt::Display,
) -> impl IntoResponse {
    (
        status,
        Json(json!({
            "success": false,
            "error": code,
            "message": message.to_string(),
            "status": status.as_u16()
        })),
    )
}
