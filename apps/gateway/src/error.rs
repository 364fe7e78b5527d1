// [apps/gateway/src/error.rs]
//! HTTP-facing error surface (spec §6 "Error codes", §7 "Error Handling
//! Design"). Wraps the pure `relay_domain::error::CoreError` and the
//! store's `StoreError`, mapping both onto the structured JSON error
//! body and status code the external interface promises.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_domain::error::CoreError;
use relay_store::StoreError;
use serde_json::json;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    detail: Option<serde_json::Value>,
}

impl AppError {
    pub fn unauthorized() -> Self {
        Self { status: StatusCode::UNAUTHORIZED, code: "unauthorized".into(), detail: None }
    }

    pub fn no_worker_for_model(model: &str) -> Self {
        Self { status: StatusCode::NOT_FOUND, code: "no_worker_for_model".into(), detail: Some(json!({ "model": model })) }
    }

    pub fn unknown_job(job_id: &str) -> Self {
        Self { status: StatusCode::NOT_FOUND, code: "unknown_job".into(), detail: Some(json!({ "jobId": job_id })) }
    }

    pub fn offset_mismatch(expected: usize) -> Self {
        Self { status: StatusCode::CONFLICT, code: "offset_mismatch".into(), detail: Some(json!({ "expected": expected })) }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, code: "internal".into(), detail: Some(json!({ "message": message.into() })) }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, code: "invalid_request".into(), detail: Some(json!({ "message": message.into() })) }
    }
}

impl From<CoreError> for AppError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Unauthorized => AppError::unauthorized(),
            CoreError::NoWorkerForModel(model) => AppError::no_worker_for_model(&model),
            CoreError::OffsetMismatch { expected } => AppError::offset_mismatch(expected),
            CoreError::UnknownJob(job_id) => AppError::unknown_job(&job_id),
            CoreError::WorkerDisconnected => Self { status: StatusCode::CONFLICT, code: "worker_disconnected".into(), detail: None },
            CoreError::Timeout => Self { status: StatusCode::GATEWAY_TIMEOUT, code: "timeout".into(), detail: None },
            CoreError::Internal(message) => AppError::internal(message),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        AppError::internal(error.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.code });
        if let Some(detail) = self.detail {
            if let (Some(map), Some(detail_map)) = (body.as_object_mut(), detail.as_object()) {
                for (key, value) in detail_map {
                    map.insert(key.clone(), value.clone());
                }
            }
        }
        (self.status, Json(body)).into_response()
    }
}
