// [apps/gateway/src/state/mod.rs]
/*!
 * =================================================================
 * APARATO: GATEWAY APPLICATION STATE (V1.0)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: COMPOSICIÓN DEL ESTADO COMPARTIDO DEL CONTROL PLANE
 *
 * The single `Clone`-able handle threaded through every axum handler.
 * Everything inside is either `Arc`-wrapped or cheap to clone, per the
 * donor's own `AppState` composition pattern.
 * =================================================================
 */

pub mod receipt_chain;
pub mod stream_multiplexer;
pub mod worker_registry;

use receipt_chain::ReceiptChain;
use relay_store::{JobRepository, ReceiptRepository, StoreClient, WorkerSecretRepository};
use std::sync::Arc;
use stream_multiplexer::StreamMultiplexer;
use worker_registry::WorkerRegistry;

#[derive(Clone)]
pub struct AppState {
    pub store: StoreClient,
    pub jobs: Arc<JobRepository>,
    pub secrets: Arc<WorkerSecretRepository>,
    pub registry: Arc<WorkerRegistry>,
    pub streams: Arc<StreamMultiplexer>,
    pub receipts: Arc<ReceiptChain>,
}

impl AppState {
    pub fn new(store: StoreClient) -> Result<Self, relay_store::StoreError> {
        let jobs = Arc::new(JobRepository::new(store.get_connection()?));
        let receipt_repo = ReceiptRepository::new(store.get_connection()?);
        let secrets = Arc::new(WorkerSecretRepository::new(store.get_connection()?));

        let receipts = Arc::new(ReceiptChain::new(receipt_repo).with_job_repository(jobs.clone()));
        let registry = Arc::new(WorkerRegistry::new());
        let streams = Arc::new(StreamMultiplexer::new(jobs.clone(), receipts.clone()));

        Ok(Self { store, jobs, secrets, registry, streams, receipts })
    }
}
