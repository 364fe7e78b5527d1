// [libs/domain/models/src/error.rs]
//! Core error taxonomy (spec §6 "Error codes", §7 "Error Handling
//! Design"). Framework-agnostic on purpose: both HTTP handlers and the
//! WebSocket/actor code paths in `apps/gateway` consume the same enum, and
//! `apps/gateway` is the only place that knows how to turn a variant into
//! an HTTP status code.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("no worker currently serves model {0:?}")]
    NoWorkerForModel(String),

    #[error("offset_mismatch: expected {expected}")]
    OffsetMismatch { expected: usize },

    #[error("unknown_job: {0}")]
    UnknownJob(String),

    #[error("worker_disconnected")]
    WorkerDisconnected,

    #[error("timeout")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The stable machine-readable code named throughout spec §6.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Unauthorized => "unauthorized",
            CoreError::NoWorkerForModel(_) => "no_worker_for_model",
            CoreError::OffsetMismatch { .. } => "offset_mismatch",
            CoreError::UnknownJob(_) => "unknown_job",
            CoreError::WorkerDisconnected => "worker_disconnected",
            CoreError::Timeout => "timeout",
            CoreError::Internal(_) => "internal",
        }
    }
}
