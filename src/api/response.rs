use serde::Serialize;
use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::warn;

use crate::error::{AppError, Result};

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub meta: ResponseMeta,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    pub status: String,
    pub status_code: u16,
    pub timestamp: String,
    pub message: Option<String>,
}

pub type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

pub fn success<T: Serialize>(data: T) -> Reply<T> {
    with_status(StatusCode::OK, data)
}

pub fn with_status<T: Serialize>(status: StatusCode, data: T) -> Reply<T> {
    let meta = ResponseMeta {
        status: "success".to_string(),
        status_code: status.as_u16(),
        timestamp: Utc::now().to_rfc3339(),
        message: None,
    };

    (
        status,
        Json(ApiResponse {
            data: Some(data),
            meta,
        }),
    )
}

pub fn error<T>(status: StatusCode, message: String) -> Reply<T> {
    let meta = ResponseMeta {
        status: "error".to_string(),
        status_code: status.as_u16(),
        timestamp: Utc::now().to_rfc3339(),
        message: Some(message),
    };

    (
        status,
        Json(ApiResponse {
            data: None,
            meta,
        }),
    )
}

/// Wraps a handler result in the response envelope.
pub fn from_result<T: Serialize>(result: Result<T>) -> Reply<T> {
    match result {
        Ok(data) => success(data),
        Err(err) => from_error(err),
    }
}

pub fn from_error<T>(err: AppError) -> Reply<T> {
    let status = err.status_code();
    if status.is_server_error() {
        warn!(error = %err, "Request failed");
    }
    error(status, err.to_string())
}
