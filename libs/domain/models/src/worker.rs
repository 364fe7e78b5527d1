// [libs/domain/models/src/worker.rs]
//! Worker identity and liveness types (spec §3 "Worker").

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Liveness state of a registered worker.
///
/// `unseen` never appears in the registry itself — it is the conceptual
/// state of a worker id that has not yet registered — but is kept in the
/// enum so API consumers can represent "worker id unknown" uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Unseen,
    Idle,
    Busy,
    Stale,
}

/// A read-only, wire-safe view of a worker suitable for registry queries
/// and the heartbeat response. Does not carry the push channel handle —
/// that lives only in the runtime registry (`apps/gateway`), never on the
/// wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub worker_id: String,
    pub models: BTreeSet<String>,
    pub region: Option<String>,
    pub runtime: Option<String>,
    pub status: WorkerStatus,
    pub last_heartbeat: chrono::DateTime<chrono::Utc>,
    pub active_job_count: usize,
    pub has_push_channel: bool,
}

/// Optional filter set accepted by registry queries (spec §4.B: "queryable
/// by `(status, region, runtime, model)` filters"). `region` and `runtime`
/// are carried through verbatim from the heartbeat body as free-form tags;
/// the core does not interpret them beyond equality filtering.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerFilter {
    pub status: Option<WorkerStatus>,
    pub region: Option<String>,
    pub runtime: Option<String>,
    pub model: Option<String>,
}

/// Body of `POST /nodes/register`. The worker proposes its own identifier;
/// a repeat registration under the same identifier rotates the secret
/// (spec §4.B).
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub worker_id: String,
    #[serde(default)]
    pub models: BTreeSet<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
}

/// Body of `POST /nodes/heartbeat`.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatRequest {
    pub models: BTreeSet<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatResponse {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub models: BTreeSet<String>,
}

/// Response to a successful `(worker_id, secret)` registration. The raw
/// secret is only ever returned here — never again, per spec §3.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResponse {
    pub worker_id: String,
    pub secret: String,
}
