// [apps/gateway/src/handlers/subscribe.rs]
/*!
 * =================================================================
 * APARATO: SUBSCRIBER-FACING HANDLERS (V1.0)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: ENTREGA DE TRANSCRIPCIONES A USUARIOS FINALES
 *
 * Three shapes for the same underlying stream: a Server-Sent-Events
 * response (`POST /chat/stream`), a duplex WebSocket with attach-time
 * catch-up, and the one-shot poll in `handlers/worker.rs::delta`. All
 * three ultimately call into `StreamMultiplexer::attach_subscriber`.
 * =================================================================
 */

use crate::middleware::UserIdentity;
use crate::services::dispatch::DispatchEngine;
use crate::state::AppState;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use relay_domain::error::CoreError;
use relay_domain::job::ChatMessage;
use relay_domain::stream::{DuplexFrame, SubscriberEvent};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

const SUBSCRIBER_MAILBOX_CAPACITY: usize = 64;
const END_TO_END_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

/// `POST /chat/stream` (spec §6). Dispatches a new job and streams its
/// transcript back as Server-Sent Events, bounded by a 5-minute
/// end-to-end wall-clock ceiling (spec §5 "Cancellation & timeouts").
pub async fn chat_stream(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    axum::Json(request): axum::Json<ChatRequest>,
) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>> {
    let (sender, receiver) = mpsc::channel(SUBSCRIBER_MAILBOX_CAPACITY);

    let (prefix, receiver) = match DispatchEngine::dispatch(&state, &identity.user_id, &request.model, request.messages, request.options, sender).await {
        Ok(job_id) => (SubscriberEvent::Started { job_id }, receiver),
        Err(error) => {
            // Close the unused subscriber mailbox so the stream ends
            // right after the error frame instead of idling for 5 minutes.
            drop(receiver);
            let (closed_sender, closed_receiver) = mpsc::channel(1);
            drop(closed_sender);
            (SubscriberEvent::Error { error: format!("{error:?}") }, closed_receiver)
        }
    };

    let prefix_stream = futures_util::stream::once(async move { Ok(event_to_sse(prefix)) });
    Sse::new(prefix_stream.chain(sse_stream(receiver))).keep_alive(KeepAlive::default())
}

/// Forwards subscriber events to SSE, emitting a terminal `{type:"error",
/// error:"timeout"}` frame if the 5-minute end-to-end ceiling elapses
/// before the stream reaches its own `done`/`error` event (spec §5
/// "Cancellation & timeouts").
fn sse_stream(mut receiver: mpsc::Receiver<SubscriberEvent>) -> impl futures_util::Stream<Item = Result<Event, Infallible>> {
    let (out_tx, out_rx) = mpsc::channel(SUBSCRIBER_MAILBOX_CAPACITY);

    tokio::spawn(async move {
        let deadline = tokio::time::sleep(END_TO_END_TIMEOUT);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                maybe_event = receiver.recv() => {
                    match maybe_event {
                        Some(event) => {
                            if out_tx.send(event_to_sse(event)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = &mut deadline => {
                    let _ = out_tx.send(event_to_sse(SubscriberEvent::Error { error: CoreError::Timeout.code().to_string() })).await;
                    break;
                }
            }
        }
    });

    ReceiverStream::new(out_rx).map(Ok)
}

fn event_to_sse(event: SubscriberEvent) -> Event {
    let payload = match &event {
        SubscriberEvent::Started { job_id } => json!({ "type": "started", "jobId": job_id }),
        SubscriberEvent::Delta { content_type, delta } => json!({ "type": "delta", "contentType": content_type, "delta": delta }),
        SubscriberEvent::Done { node_id } => json!({ "type": "done", "nodeId": node_id }),
        SubscriberEvent::Error { error } => json!({ "type": "error", "error": error }),
    };
    Event::default().json_data(payload).expect("SubscriberEvent serializes infallibly")
}

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    #[serde(rename = "jobId")]
    pub job_id: String,
    #[serde(default)]
    pub since: Option<usize>,
}

/// Long-lived duplex subscriber channel (spec §6 "Subscriber polling
/// alternatives"). Delivers the backlog catch-up frame on attach, then
/// live delta frames as they arrive.
pub async fn subscribe_socket(
    websocket: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<SubscribeQuery>,
) -> impl IntoResponse {
    websocket.on_upgrade(move |socket| run_subscriber_socket(socket, state, query.job_id, query.since))
}

async fn run_subscriber_socket(socket: WebSocket, state: AppState, job_id: String, since: Option<usize>) {
    use axum::extract::ws::Message as WsMessage;

    let (mut sink, mut source) = socket.split();
    let (sender, receiver) = mpsc::channel(SUBSCRIBER_MAILBOX_CAPACITY);
    let (subscriber_id, mut backlog_pending) = state.streams.attach_subscriber(&job_id, since, sender).await;

    let mut receiver = ReceiverStream::new(receiver);
    let job_id_for_forward = job_id.clone();

    let mut forward_task = tokio::spawn(async move {
        let mut offset = since.unwrap_or(0);
        let deadline = tokio::time::sleep(END_TO_END_TIMEOUT);
        tokio::pin!(deadline);

        loop {
            let event = tokio::select! {
                event = receiver.next() => event,
                _ = &mut deadline => {
                    let timeout = DuplexFrame::Timeout { job_id: job_id_for_forward.clone() };
                    let payload = serde_json::to_string(&timeout).expect("DuplexFrame serializes infallibly");
                    let _ = sink.send(WsMessage::Text(payload)).await;
                    break;
                }
            };

            let Some(event) = event else { break };

            let frame = match event {
                SubscriberEvent::Delta { content_type, delta } => {
                    offset += delta.chars().count();
                    let delta_frame = relay_domain::stream::DeltaFrame { job_id: job_id_for_forward.clone(), offset, delta, content_type, done: false };
                    if backlog_pending {
                        backlog_pending = false;
                        DuplexFrame::Backlog { job_id: delta_frame.job_id, offset: delta_frame.offset, delta: delta_frame.delta }
                    } else {
                        DuplexFrame::Delta(delta_frame)
                    }
                }
                SubscriberEvent::Done { .. } => DuplexFrame::Delta(relay_domain::stream::DeltaFrame {
                    job_id: job_id_for_forward.clone(),
                    offset,
                    delta: String::new(),
                    content_type: relay_domain::stream::ContentType::Response,
                    done: true,
                }),
                SubscriberEvent::Error { .. } | SubscriberEvent::Started { .. } => continue,
            };
            let payload = serde_json::to_string(&frame).expect("DuplexFrame serializes infallibly");
            if sink.send(WsMessage::Text(payload)).await.is_err() {
                break;
            }
        }
        let _ = sink.send(WsMessage::Close(None)).await;
    });

    let mut drain_task = tokio::spawn(async move { while source.next().await.is_some() {} });

    tokio::select! {
        _ = &mut forward_task => drain_task.abort(),
        _ = &mut drain_task => forward_task.abort(),
    }

    state.streams.detach_subscriber(&job_id, subscriber_id).await;
    debug!("🔌 [SUBSCRIBE_SOCKET]: Subscriber {} detached from job [{}]", subscriber_id, job_id);
}
