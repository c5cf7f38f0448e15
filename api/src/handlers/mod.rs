pub mod docs;
pub mod health;
pub mod metrics;
pub mod reports;

// Common response types
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::errors::{DatabaseError, ValidationError};
use serde::Serialize;

/// Standard API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub trace_id: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.error.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "validation_error" => StatusCode::BAD_REQUEST,
            "service_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<DatabaseError> for ErrorResponse {
    fn from(err: DatabaseError) -> Self {
        let code = match err {
            DatabaseError::ConnectionFailed(_)
            | DatabaseError::QueryExecutionFailed(_)
            | DatabaseError::PoolExhausted(_)
            | DatabaseError::HealthCheckFailed(_) => "service_unavailable",
            _ => "internal_error",
        };
        ErrorResponse::new(code, err.to_string())
    }
}

impl From<ValidationError> for ErrorResponse {
    fn from(err: ValidationError) -> Self {
        let code = match err {
            ValidationError::UnknownReport(_) => "not_found",
            _ => "validation_error",
        };
        ErrorResponse::new(code, err.to_string())
    }
}

/// Standard API success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for SuccessResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
