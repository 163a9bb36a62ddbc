use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use khata_core::DomainError;
use khata_infra::ServiceError;

pub type ApiResult = Result<axum::response::Response, axum::response::Response>;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        ServiceError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        ServiceError::Forbidden => json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden"),
        ServiceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::Interrupted => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "interrupted",
            "computation was interrupted, retry the request",
        ),
        ServiceError::Unavailable(msg) => {
            tracing::error!(error = %msg, "store unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "store temporarily unavailable")
        }
        ServiceError::Internal(msg) => {
            tracing::error!(error = %msg, "internal error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

/// Request-parsing failures are reported exactly like service validation errors.
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    service_error_to_response(err.into())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
