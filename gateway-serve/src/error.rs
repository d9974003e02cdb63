//! Maps [`GatewayError`] and [`MemoryError`] onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use gateway_core::GatewayError;
use memory_pipeline::MemoryError;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    class: &'static str,
}

pub struct ApiError {
    status: StatusCode,
    class: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            class: self.class,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            class: err.class(),
            message: err.to_string(),
        }
    }
}

impl From<MemoryError> for ApiError {
    fn from(err: MemoryError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            class: "memory_error",
            message: err.to_string(),
        }
    }
}
