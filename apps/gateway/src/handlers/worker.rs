// [apps/gateway/src/handlers/worker.rs]
/*!
 * =================================================================
 * APARATO: WORKER-FACING HTTP HANDLERS (V1.0)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: REGISTRO, LATIDO, Y ENTREGA PULL DE TRABAJOS
 *
 * Every handler in this file sits behind `middleware::worker_auth_guard`
 * (spec §4.A) and receives the caller's verified identity through the
 * request extension it injects.
 * =================================================================
 */

use crate::error::AppError;
use crate::middleware::WorkerIdentity;
use crate::state::AppState;
use axum::extract::{Extension, Query, State};
use axum::Json;
use relay_domain::job::{CompleteRequest, JobStatus, PolledJob};
use relay_domain::stream::{ApplyOutcome, ProducerFrame};
use relay_domain::worker::{HeartbeatRequest, HeartbeatResponse, RegisterRequest, RegistrationResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

/// `POST /nodes/register` (spec §4.B). Re-registering an already-known
/// worker id rotates its secret.
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<Json<RegistrationResponse>, AppError> {
    let secret = crate::auth::mint_secret();
    let secret_hex = hex::encode(&secret);

    state.secrets.upsert(&request.worker_id, &secret_hex).await?;
    state.registry.register(&request.worker_id, request.models, request.region, request.runtime);

    info!("📡 [WORKER_REGISTER]: Worker [{}] registered", request.worker_id);
    Ok(Json(RegistrationResponse { worker_id: request.worker_id, secret: secret_hex }))
}

/// `POST /nodes/heartbeat` (spec §4.B). Implicit registration for a
/// worker id whose secret exists but whose registry entry lapsed — the
/// heartbeat re-seeds it with the declared models.
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(identity): Extension<WorkerIdentity>,
    Json(request): Json<HeartbeatRequest>,
) -> Json<HeartbeatResponse> {
    let status = state
        .registry
        .heartbeat(&identity.worker_id, Some(request.models.clone()))
        .unwrap_or_else(|| {
            state.registry.register(&identity.worker_id, request.models.clone(), request.region.clone(), request.runtime.clone());
            relay_domain::worker::WorkerStatus::Idle
        });

    Json(HeartbeatResponse { worker_id: identity.worker_id, status, models: request.models })
}

/// `GET /inference/poll` (spec §4.C, §6). Claims the oldest eligible
/// pending job across the worker's declared models, or `not-found`.
pub async fn poll(State(state): State<AppState>, Extension(identity): Extension<WorkerIdentity>) -> Result<Json<Value>, AppError> {
    let models = state.registry.models_for(&identity.worker_id);
    match state.jobs.claim_next(&identity.worker_id, &models).await? {
        Some(job) => {
            state.registry.mark_claimed(&identity.worker_id, &job.id);
            let polled = PolledJob { id: job.id, model: job.model, messages: job.messages };
            Ok(Json(serde_json::to_value(polled).expect("PolledJob serialization is infallible")))
        }
        None => Ok(Json(json!({ "status": "not-found" }))),
    }
}

/// `POST /inference/complete` (spec §6). Terminal-only: flips the job's
/// status and fires the stream multiplexer's out-of-band finalize path.
pub async fn complete(
    State(state): State<AppState>,
    Extension(identity): Extension<WorkerIdentity>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = match request.status {
        JobStatus::Completed => crate::state::stream_multiplexer::FinalizeOutcome::Completed { response_override: request.response.clone() },
        JobStatus::Failed => crate::state::stream_multiplexer::FinalizeOutcome::Failed { error: request.error.clone().unwrap_or_else(|| "unknown error".to_string()) },
        _ => return Err(AppError::invalid_request("completion status must be completed or failed")),
    };

    state.streams.finalize(&request.id, outcome).await;
    state.registry.release_job(&identity.worker_id, &request.id);

    info!("🏁 [WORKER_COMPLETE]: Job [{}] finalized by worker [{}]", request.id, identity.worker_id);
    Ok(Json(json!({ "ok": true })))
}

/// `POST /inference/stream` (spec §4.E, §6) — the pull-path producer
/// frame. Response mirrors `ApplyOutcome` directly.
pub async fn stream(State(state): State<AppState>, Json(frame): Json<ProducerFrame>) -> Json<ApplyOutcome> {
    Json(state.streams.apply(frame).await)
}

#[derive(Debug, Deserialize)]
pub struct DeltaQuery {
    #[serde(rename = "jobId")]
    pub job_id: String,
    #[serde(default)]
    pub since: usize,
}

/// `GET /inference/delta?jobId=&since=` (spec §6, subscriber polling
/// alternative). Not behind the worker guard — callers are subscribers —
/// kept here alongside the other stream-adjacent handlers for locality.
pub async fn delta(State(state): State<AppState>, Query(query): Query<DeltaQuery>) -> Json<Value> {
    match state.streams.poll(&query.job_id, query.since).await {
        crate::state::stream_multiplexer::PollResult::Delta { offset, delta, done } => {
            Json(json!({ "jobId": query.job_id, "offset": offset, "delta": delta, "done": done }))
        }
        crate::state::stream_multiplexer::PollResult::NoContent => Json(json!({ "status": "no-content" })),
    }
}
