//! [libs/infra/db/src/lib.rs]
//! Tactical persistence adapter (libSQL) for the job store, receipt
//! chain, and worker secret vault (spec §4.C, §4.F, §3 "Worker Secret").

pub mod client;
pub mod errors;
pub mod repositories;
pub mod schema;

pub use client::StoreClient;
pub use errors::StoreError;
pub use repositories::{JobRepository, ReceiptRepository, WorkerSecretRepository};
