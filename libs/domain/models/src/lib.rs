//! [libs/domain/models/src/lib.rs]
//! Shared domain types for the inference control plane. Single source of
//! truth for the shapes that cross the worker, dispatch, stream, and
//! receipt boundaries — deliberately framework-agnostic (no axum, no
//! libsql) so it can be depended on by both the persistence layer and
//! the gateway application without a circular dependency.

pub mod error;
pub mod job;
pub mod receipt;
pub mod stream;
pub mod worker;

pub mod prelude {
    pub use crate::error::CoreError;
    pub use crate::job::{ChatMessage, Job, JobStatus};
    pub use crate::receipt::Receipt;
    pub use crate::stream::{ContentType, DeltaFrame};
    pub use crate::worker::{WorkerSnapshot, WorkerStatus};
}

#[cfg(test)]
#[path = "tests_serialization.rs"]
mod tests_serialization;
