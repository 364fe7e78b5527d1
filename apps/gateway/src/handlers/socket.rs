// [apps/gateway/src/handlers/socket.rs]
/*!
 * =================================================================
 * APARATO: WORKER PUSH SOCKET (V1.0)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: ENLACE FULL-DUPLEX PARA ENTREGA PUSH DE TRABAJOS
 *
 * Triple-task orchestration, mirroring the donor's neural uplink: a
 * downstream task forwards push-path job envelopes (and keepalive
 * pings) to the socket; an upstream task reads inbound worker frames
 * and forwards them to an internal command channel; a tactical worker
 * task drains that channel against the registry and stream state. The
 * first task to finish triggers a coordinated teardown of the other two.
 * =================================================================
 */

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{sink::SinkExt, stream::StreamExt};
use relay_domain::stream::{ServerFrame, WorkerFrame};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

/// Worker push socket heartbeat timeout (spec §5: "60s heartbeat timeout").
const KEEPALIVE_INTERVAL_SECONDS: u64 = 25;
const COMMAND_BUFFER_CAPACITY: usize = 32;

#[derive(Debug, Deserialize)]
pub struct HandshakeQuery {
    #[serde(rename = "workerId")]
    pub worker_id: String,
    pub token: String,
}

/// Negotiates the protocol transition, rejecting before upgrade if the
/// handshake token does not match the worker's secret (spec §6:
/// "authenticated at handshake by worker id plus a one-time token
/// derived from the worker secret").
pub async fn upgrade(websocket: WebSocketUpgrade, State(state): State<AppState>, Query(query): Query<HandshakeQuery>) -> impl IntoResponse {
    let secret_hex = match state.secrets.get(&query.worker_id).await {
        Ok(Some(secret_hex)) => secret_hex,
        _ => return axum::http::StatusCode::UNAUTHORIZED.into_response(),
    };

    let secret = match hex::decode(&secret_hex) {
        Ok(secret) => secret,
        Err(_) => return axum::http::StatusCode::UNAUTHORIZED.into_response(),
    };

    let expected = crate::auth::derive_handshake_token(&secret);
    if query.token != expected {
        warn!("❌ [SOCKET_HANDSHAKE]: Worker [{}] presented an invalid handshake token", query.worker_id);
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    }

    debug!("🔌 [SOCKET_UPGRADE]: Worker [{}] handshake accepted", query.worker_id);
    websocket.on_upgrade(move |socket| run_worker_socket(socket, state, query.worker_id))
}

async fn run_worker_socket(socket: WebSocket, state: AppState, worker_id: String) {
    let (mut socket_sender, mut socket_receiver) = socket.split();

    let (push_sender, mut push_receiver) = mpsc::channel::<ServerFrame>(COMMAND_BUFFER_CAPACITY);
    state.registry.attach_push_channel(&worker_id, push_sender);
    info!("⚡ [WORKER_SOCKET]: Worker [{}] push channel attached", worker_id);

    if socket_sender
        .send(Message::Text(serde_json::to_string(&ServerFrame::Registered { worker_id: worker_id.clone() }).expect("ServerFrame serializes infallibly")))
        .await
        .is_err()
    {
        state.registry.detach_push_channel(&worker_id);
        return;
    }

    let (command_sender, mut command_receiver) = mpsc::channel::<String>(COMMAND_BUFFER_CAPACITY);

    let tactical_state = state.clone();
    let tactical_worker_id = worker_id.clone();
    let mut tactical_task = tokio::spawn(async move {
        while let Some(raw_frame) = command_receiver.recv().await {
            if let Err(error) = handle_worker_frame(&tactical_state, &tactical_worker_id, &raw_frame).await {
                warn!("⚠️ [WORKER_SOCKET]: Directive from [{}] rejected: {}", tactical_worker_id, error);
            }
        }
    });

    let downstream_worker_id = worker_id.clone();
    let mut downstream_task = tokio::spawn(async move {
        let mut keepalive = interval(Duration::from_secs(KEEPALIVE_INTERVAL_SECONDS));

        loop {
            tokio::select! {
                _ = keepalive.tick() => {
                    if socket_sender.send(Message::Ping(vec![])).await.is_err() {
                        break;
                    }
                }
                maybe_frame = push_receiver.recv() => {
                    match maybe_frame {
                        Some(frame) => {
                            let payload = serde_json::to_string(&frame).expect("ServerFrame serializes infallibly");
                            if socket_sender.send(Message::Text(payload)).await.is_err() {
                                warn!("⚠️ [WORKER_SOCKET]: Lost downstream link to [{}]", downstream_worker_id);
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });

    let upstream_worker_id = worker_id.clone();
    let mut upstream_task = tokio::spawn(async move {
        while let Some(message) = socket_receiver.next().await {
            match message {
                Ok(Message::Text(raw)) => {
                    if command_sender.send(raw).await.is_err() {
                        error!("❌ [WORKER_SOCKET]: Internal command buffer collapsed for [{}]", upstream_worker_id);
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("🔌 [WORKER_SOCKET]: Worker [{}] closed the socket", upstream_worker_id);
                    break;
                }
                Err(error) => {
                    warn!("❌ [WORKER_SOCKET]: Transport error from [{}]: {}", upstream_worker_id, error);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut downstream_task => {
            upstream_task.abort();
            tactical_task.abort();
        }
        _ = &mut upstream_task => {
            downstream_task.abort();
            tactical_task.abort();
        }
        _ = &mut tactical_task => {
            downstream_task.abort();
            upstream_task.abort();
        }
    }

    state.registry.detach_push_channel(&worker_id);
    info!("💀 [WORKER_SOCKET]: Worker [{}] push channel released", worker_id);
}

async fn handle_worker_frame(state: &AppState, worker_id: &str, raw_frame: &str) -> Result<(), String> {
    let frame: WorkerFrame = serde_json::from_str(raw_frame).map_err(|error| error.to_string())?;

    match frame {
        WorkerFrame::Heartbeat { models } => {
            state.registry.heartbeat(worker_id, Some(models));
        }
        WorkerFrame::Token { job_id, reasoning, token, done } => {
            // Apply both channels' deltas with `done: false` first, then
            // finalize once, explicitly — applying either delta with
            // `done: true` would finalize the job before the other
            // channel's delta in this same frame is appended.
            if let Some(delta) = reasoning {
                state
                    .streams
                    .apply(relay_domain::stream::ProducerFrame {
                        job_id: job_id.clone(),
                        seq: None,
                        offset: None,
                        delta: Some(delta),
                        cumulative: None,
                        chunk: None,
                        content_type: relay_domain::stream::ContentType::Reasoning,
                        reasoning: None,
                        done: false,
                    })
                    .await;
            }
            if let Some(delta) = token {
                state
                    .streams
                    .apply(relay_domain::stream::ProducerFrame {
                        job_id: job_id.clone(),
                        seq: None,
                        offset: None,
                        delta: Some(delta),
                        cumulative: None,
                        chunk: None,
                        content_type: relay_domain::stream::ContentType::Response,
                        reasoning: None,
                        done: false,
                    })
                    .await;
            }
            if done {
                state
                    .streams
                    .finalize(&job_id, crate::state::stream_multiplexer::FinalizeOutcome::Completed { response_override: None })
                    .await;
                state.registry.release_job(worker_id, &job_id);
            }
        }
        WorkerFrame::JobComplete { job_id, response } => {
            state
                .streams
                .finalize(&job_id, crate::state::stream_multiplexer::FinalizeOutcome::Completed { response_override: Some(response) })
                .await;
            state.registry.release_job(worker_id, &job_id);
        }
        WorkerFrame::JobError { job_id, error } => {
            state.streams.finalize(&job_id, crate::state::stream_multiplexer::FinalizeOutcome::Failed { error }).await;
            state.registry.release_job(worker_id, &job_id);
        }
        WorkerFrame::Status { detail } => {
            debug!("📋 [WORKER_STATUS]: [{}]: {}", worker_id, detail);
        }
    }

    Ok(())
}
