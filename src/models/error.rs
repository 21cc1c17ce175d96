use axum::Json;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn respond(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Logs the underlying failure; clients only ever see a generic message.
pub fn internal_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("Internal error: {}", e);
    respond(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

pub fn upstream_error(message: impl Into<String>) -> ApiError {
    respond(StatusCode::BAD_GATEWAY, message)
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    respond(StatusCode::BAD_REQUEST, message)
}

pub fn unauthorized(message: impl Into<String>) -> ApiError {
    respond(StatusCode::UNAUTHORIZED, message)
}

pub fn forbidden(message: impl Into<String>) -> ApiError {
    respond(StatusCode::FORBIDDEN, message)
}

pub fn not_found(message: impl Into<String>) -> ApiError {
    respond(StatusCode::NOT_FOUND, message)
}

pub fn conflict(message: impl Into<String>) -> ApiError {
    respond(StatusCode::CONFLICT, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_error_hides_detail() {
        let (status, body) = internal_error("connection refused at 10.0.0.1:5432");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0.error, "Internal server error");
    }

    #[test]
    fn test_client_errors_keep_their_message() {
        let (status, body) = bad_request("Quantity must be at least 1");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.0.error, "Quantity must be at least 1");
    }
}
