use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::OracleUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::OracleUnavailable,
                None,
            ),
            AppError::IdentityMissing => {
                (StatusCode::UNAUTHORIZED, ErrorCode::IdentityMissing, None)
            }
            AppError::CacheWriteFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::CacheWriteFailed,
                None,
            ),
            AppError::LifecycleOperationFailed(_) => (
                StatusCode::BAD_GATEWAY,
                ErrorCode::LifecycleOperationFailed,
                Some("The billing provider could not complete the request".to_string()),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::DatabaseError,
                None,
            ),
            AppError::InvalidInput(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidInput,
                Some(msg.clone()),
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, ErrorCode::Forbidden, None),
            AppError::NotFound => (StatusCode::NOT_FOUND, ErrorCode::NotFound, None),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError,
                None,
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed");
        } else {
            tracing::debug!(error = ?self, "Request rejected");
        }

        error_resp(status, code, message)
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}
