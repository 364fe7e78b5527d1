// [apps/gateway/src/state/stream_multiplexer.rs]
/*!
 * =================================================================
 * APARATO: STREAM MULTIPLEXER (V1.0)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L3 — EL NÚCLEO)
 * RESPONSABILIDAD: TRANSCRIPCIÓN POR JOB, DISCIPLINA DE OFFSETS,
 *                   FAN-OUT DE SUBSCRIPTORES Y CATCH-UP
 *
 * Per-job state is owned by a dedicated actor task; the only way to
 * mutate a job's transcript, offsets, or subscriber set is through its
 * `mpsc` command channel. This replaces a global broadcast bus with one
 * serialized writer per job, the pattern the push-socket handler already
 * uses internally for its command queue (see `handlers/socket.rs`).
 * =================================================================
 */

use relay_domain::stream::{ApplyOutcome, ContentType, ProducerFrame, SubscriberEvent};
use relay_store::JobRepository;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::receipt_chain::ReceiptChain;

/// Subscriber mailbox capacity. A subscriber that cannot keep up is
/// dropped rather than allowed to stall the job's single writer
/// (spec §5: "a slow subscriber must not block others").
const SUBSCRIBER_BUFFER_CAPACITY: usize = 64;

/// How long a terminal stream state is retained for late catch-up
/// (spec §3 "Job Stream State" lifecycle).
const EVICTION_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub enum FinalizeOutcome {
    Completed { response_override: Option<String> },
    Failed { error: String },
}

pub enum PollResult {
    Delta { offset: usize, delta: String, done: bool },
    NoContent,
}

enum StreamCommand {
    Apply { frame: ProducerFrame, reply: oneshot::Sender<ApplyOutcome> },
    Attach { since: Option<usize>, sender: mpsc::Sender<SubscriberEvent>, reply: oneshot::Sender<(Uuid, bool)> },
    Detach { subscriber_id: Uuid },
    Poll { since: usize, reply: oneshot::Sender<PollResult> },
    Finalize { outcome: FinalizeOutcome },
}

/// Dependencies every job actor needs to persist its final transcript and
/// trigger the receipt chain. Shared by reference across all actors.
struct ActorDeps {
    job_id: String,
    jobs: Arc<JobRepository>,
    receipts: Arc<ReceiptChain>,
}

struct ActorState {
    response_text: String,
    response_offset: usize,
    reasoning_text: String,
    reasoning_offset: usize,
    seen_seq: HashSet<u64>,
    subscribers: HashMap<Uuid, mpsc::Sender<SubscriberEvent>>,
    terminal: bool,
}

impl ActorState {
    fn new() -> Self {
        Self {
            response_text: String::new(),
            response_offset: 0,
            reasoning_text: String::new(),
            reasoning_offset: 0,
            seen_seq: HashSet::new(),
            subscribers: HashMap::new(),
            terminal: false,
        }
    }

    fn channel_mut(&mut self, content_type: ContentType) -> (&mut String, &mut usize) {
        match content_type {
            ContentType::Response => (&mut self.response_text, &mut self.response_offset),
            ContentType::Reasoning => (&mut self.reasoning_text, &mut self.reasoning_offset),
        }
    }

    fn broadcast(&mut self, event: SubscriberEvent) {
        self.subscribers.retain(|subscriber_id, sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                debug!("🔕 [MULTIPLEXER]: Dropping unresponsive subscriber {}", subscriber_id);
                false
            }
        });
    }
}

/// Computes the delta to apply per spec §4.E step 3, and the "cumulative
/// shorter than committed" case from the spec's open-question resolution:
/// treated as `offset_mismatch` rather than silently producing an empty
/// delta.
fn effective_delta(frame: &ProducerFrame, current_offset: usize) -> Result<String, ()> {
    if let Some(delta) = &frame.delta {
        return Ok(delta.clone());
    }
    if let Some(cumulative) = &frame.cumulative {
        let cumulative_len = cumulative.chars().count();
        if cumulative_len < current_offset {
            return Err(());
        }
        return Ok(cumulative.chars().skip(current_offset).collect());
    }
    if let Some(chunk) = &frame.chunk {
        return Ok(chunk.clone());
    }
    Ok(String::new())
}

async fn run_actor(deps: ActorDeps, mut receiver: mpsc::Receiver<StreamCommand>, registry_cleanup: Arc<RwLock<HashMap<String, mpsc::Sender<StreamCommand>>>>) {
    let mut state = ActorState::new();
    let mut evict_at: Option<Instant> = None;

    loop {
        let sleep_until_evict = async {
            match evict_at {
                Some(instant) => sleep_until(instant).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            maybe_command = receiver.recv() => {
                match maybe_command {
                    Some(command) => {
                        if handle_command(&deps, &mut state, command).await && evict_at.is_none() {
                            evict_at = Some(Instant::now() + EVICTION_DELAY);
                        }
                    }
                    None => break,
                }
            }
            _ = sleep_until_evict, if evict_at.is_some() => {
                debug!("⏳ [MULTIPLEXER]: Evicting stream state for job [{}]", deps.job_id);
                break;
            }
        }
    }

    registry_cleanup.write().expect("stream registry lock poisoned").remove(&deps.job_id);
}

/// Returns `true` if this command just transitioned the stream into its
/// terminal state (so the caller can arm the eviction timer).
async fn handle_command(deps: &ActorDeps, state: &mut ActorState, command: StreamCommand) -> bool {
    match command {
        StreamCommand::Apply { frame, reply } => {
            let (outcome, went_terminal) = apply_frame(deps, state, frame).await;
            let _ = reply.send(outcome);
            went_terminal
        }
        StreamCommand::Attach { since, sender, reply } => {
            let subscriber_id = Uuid::new_v4();
            let clamped_since = since.unwrap_or(state.response_offset).min(state.response_offset);

            let backlog_sent = clamped_since < state.response_offset;
            if backlog_sent {
                let backlog: String = state.response_text.chars().skip(clamped_since).collect();
                let _ = sender.try_send(SubscriberEvent::Delta { content_type: ContentType::Response, delta: backlog });
            }

            state.subscribers.insert(subscriber_id, sender);
            let _ = reply.send((subscriber_id, backlog_sent));
            false
        }
        StreamCommand::Detach { subscriber_id } => {
            state.subscribers.remove(&subscriber_id);
            false
        }
        StreamCommand::Poll { since, reply } => {
            let clamped_since = since.min(state.response_offset);
            let result = if clamped_since < state.response_offset {
                let delta: String = state.response_text.chars().skip(clamped_since).collect();
                PollResult::Delta { offset: clamped_since, delta, done: state.terminal }
            } else if state.terminal {
                PollResult::Delta { offset: state.response_offset, delta: String::new(), done: true }
            } else {
                PollResult::NoContent
            };
            let _ = reply.send(result);
            false
        }
        StreamCommand::Finalize { outcome } => finalize(deps, state, outcome).await,
    }
}

async fn apply_frame(deps: &ActorDeps, state: &mut ActorState, frame: ProducerFrame) -> (ApplyOutcome, bool) {
    if state.terminal {
        let (_, offset) = match frame.content_type {
            ContentType::Response => (&state.response_text, state.response_offset),
            ContentType::Reasoning => (&state.reasoning_text, state.reasoning_offset),
        };
        return (ApplyOutcome::Ok { offset }, false);
    }

    if let Some(seq) = frame.seq {
        if state.seen_seq.contains(&seq) {
            let offset = match frame.content_type {
                ContentType::Response => state.response_offset,
                ContentType::Reasoning => state.reasoning_offset,
            };
            return (ApplyOutcome::Ok { offset }, false);
        }
    }

    let current_offset = match frame.content_type {
        ContentType::Response => state.response_offset,
        ContentType::Reasoning => state.reasoning_offset,
    };

    let delta = match effective_delta(&frame, current_offset) {
        Ok(delta) => delta,
        Err(()) => return (ApplyOutcome::OffsetMismatch { expected: current_offset }, false),
    };

    if let Some(offset) = frame.offset {
        if offset != current_offset {
            return (ApplyOutcome::OffsetMismatch { expected: current_offset }, false);
        }
    }

    let content_type = frame.content_type;
    let offset_before = current_offset;
    let delta_len = delta.chars().count();

    {
        let (text, offset) = state.channel_mut(content_type);
        text.push_str(&delta);
        *offset += delta_len;
    }

    if let Some(seq) = frame.seq {
        state.seen_seq.insert(seq);
    }

    state.broadcast(SubscriberEvent::Delta { content_type, delta });

    let new_offset = match content_type {
        ContentType::Response => state.response_offset,
        ContentType::Reasoning => state.reasoning_offset,
    };

    if frame.done {
        let went_terminal = finalize(deps, state, FinalizeOutcome::Completed { response_override: None }).await;
        return (ApplyOutcome::Ok { offset: new_offset }, went_terminal);
    }

    (ApplyOutcome::Ok { offset: new_offset }, false)
}

async fn finalize(deps: &ActorDeps, state: &mut ActorState, outcome: FinalizeOutcome) -> bool {
    if state.terminal {
        return false;
    }
    state.terminal = true;

    match outcome {
        FinalizeOutcome::Completed { response_override } => {
            let final_response = response_override.unwrap_or_else(|| state.response_text.clone());
            state.broadcast(SubscriberEvent::Done { node_id: None });

            if let Err(error) = deps.jobs.update_status(&deps.job_id, relay_domain::job::JobStatus::Completed, Some(&final_response), None).await {
                warn!("⚠️ [MULTIPLEXER]: Failed to persist completion for job [{}]: {}", deps.job_id, error);
            }

            deps.receipts.on_job_completed(&deps.job_id, &final_response).await;

            info!("✅ [MULTIPLEXER]: Job [{}] reached terminal state (completed).", deps.job_id);
        }
        FinalizeOutcome::Failed { error } => {
            state.broadcast(SubscriberEvent::Error { error: error.clone() });

            if let Err(persist_error) = deps.jobs.update_status(&deps.job_id, relay_domain::job::JobStatus::Failed, None, Some(&error)).await {
                warn!("⚠️ [MULTIPLEXER]: Failed to persist failure for job [{}]: {}", deps.job_id, persist_error);
            }

            warn!("🛑 [MULTIPLEXER]: Job [{}] reached terminal state (failed: {}).", deps.job_id, error);
        }
    }

    true
}

/// Owns the map of live per-job actors and dispatches commands to them,
/// spawning a fresh actor on first touch (spec §3: "created on first
/// producer frame or first subscriber attach").
pub struct StreamMultiplexer {
    jobs: Arc<RwLock<HashMap<String, mpsc::Sender<StreamCommand>>>>,
    job_repo: Arc<JobRepository>,
    receipts: Arc<ReceiptChain>,
}

impl StreamMultiplexer {
    pub fn new(job_repo: Arc<JobRepository>, receipts: Arc<ReceiptChain>) -> Self {
        Self { jobs: Arc::new(RwLock::new(HashMap::new())), job_repo, receipts }
    }

    fn get_or_spawn(&self, job_id: &str) -> mpsc::Sender<StreamCommand> {
        if let Some(sender) = self.jobs.read().expect("stream registry lock poisoned").get(job_id) {
            return sender.clone();
        }

        let mut guard = self.jobs.write().expect("stream registry lock poisoned");
        if let Some(sender) = guard.get(job_id) {
            return sender.clone();
        }

        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER_CAPACITY);
        let deps = ActorDeps { job_id: job_id.to_string(), jobs: self.job_repo.clone(), receipts: self.receipts.clone() };
        let registry_cleanup = self.jobs.clone();
        tokio::spawn(run_actor(deps, receiver, registry_cleanup));
        guard.insert(job_id.to_string(), sender.clone());
        sender
    }

    /// Applies a producer frame through the unified rule (spec §4.E).
    pub async fn apply(&self, frame: ProducerFrame) -> ApplyOutcome {
        let sender = self.get_or_spawn(&frame.job_id);
        let (reply_tx, reply_rx) = oneshot::channel();
        if sender.send(StreamCommand::Apply { frame, reply: reply_tx }).await.is_err() {
            return ApplyOutcome::OffsetMismatch { expected: 0 };
        }
        reply_rx.await.unwrap_or(ApplyOutcome::OffsetMismatch { expected: 0 })
    }

    /// Attaches a subscriber, delivering backlog per spec §4.E
    /// "Attach-time catch-up" if `since` trails the committed offset.
    /// Returns the subscriber id plus whether a backlog frame was sent, so
    /// callers that need to distinguish catch-up from live deltas (the
    /// duplex socket's `DuplexFrame::Backlog`) don't have to guess from the
    /// first frame alone.
    pub async fn attach_subscriber(&self, job_id: &str, since: Option<usize>, sender: mpsc::Sender<SubscriberEvent>) -> (Uuid, bool) {
        let actor = self.get_or_spawn(job_id);
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = actor.send(StreamCommand::Attach { since, sender, reply: reply_tx }).await;
        reply_rx.await.unwrap_or_else(|_| (Uuid::new_v4(), false))
    }

    pub async fn detach_subscriber(&self, job_id: &str, subscriber_id: Uuid) {
        let actor = self.jobs.read().expect("stream registry lock poisoned").get(job_id).cloned();
        if let Some(actor) = actor {
            let _ = actor.send(StreamCommand::Detach { subscriber_id }).await;
        }
    }

    /// Services a single poll (`GET /inference/delta`) without registering
    /// a persistent subscriber.
    pub async fn poll(&self, job_id: &str, since: usize) -> PollResult {
        let actor = self.get_or_spawn(job_id);
        let (reply_tx, reply_rx) = oneshot::channel();
        if actor.send(StreamCommand::Poll { since, reply: reply_tx }).await.is_err() {
            return PollResult::NoContent;
        }
        reply_rx.await.unwrap_or(PollResult::NoContent)
    }

    /// Out-of-band terminal signal, used by `POST /inference/complete` and
    /// by `job_complete` / `job_error` push frames and worker-disconnect
    /// handling — distinct from a token frame's own `done` flag.
    pub async fn finalize(&self, job_id: &str, outcome: FinalizeOutcome) {
        let actor = self.get_or_spawn(job_id);
        let _ = actor.send(StreamCommand::Finalize { outcome }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::StoreClient;

    async fn multiplexer() -> (StoreClient, StreamMultiplexer) {
        let client = StoreClient::connect(":memory:", None).await.unwrap();
        let job_repo = Arc::new(JobRepository::new(client.get_connection().unwrap()));
        let receipt_repo = relay_store::ReceiptRepository::new(client.get_connection().unwrap());
        let receipts = Arc::new(ReceiptChain::new(receipt_repo));
        (client, StreamMultiplexer::new(job_repo, receipts))
    }

    fn frame(job_id: &str, seq: Option<u64>, offset: Option<usize>, delta: &str, done: bool) -> ProducerFrame {
        ProducerFrame {
            job_id: job_id.to_string(),
            seq,
            offset,
            delta: Some(delta.to_string()),
            cumulative: None,
            chunk: None,
            content_type: ContentType::Response,
            reasoning: None,
            done,
        }
    }

    #[tokio::test]
    async fn code_point_offsets_advance_by_scalar_count_not_bytes() {
        let (_client, mux) = multiplexer().await;
        let jobs = jobs_for_test(&mux).await;
        jobs.create("job-1", "u1", "llama3.2", &[]).await.unwrap();

        let outcome = mux.apply(frame("job-1", None, Some(0), " 👋", false)).await;
        match outcome {
            ApplyOutcome::Ok { offset } => assert_eq!(offset, 2),
            other => panic!("expected Ok, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn offset_mismatch_leaves_state_unchanged() {
        let (_client, mux) = multiplexer().await;
        let jobs = jobs_for_test(&mux).await;
        jobs.create("job-1", "u1", "llama3.2", &[]).await.unwrap();

        mux.apply(frame("job-1", None, Some(0), "foo", false)).await;
        let outcome = mux.apply(frame("job-1", None, Some(2), "bar", false)).await;
        match outcome {
            ApplyOutcome::OffsetMismatch { expected } => assert_eq!(expected, 3),
            other => panic!("expected OffsetMismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn duplicate_seq_is_idempotent() {
        let (_client, mux) = multiplexer().await;
        let jobs = jobs_for_test(&mux).await;
        jobs.create("job-1", "u1", "llama3.2", &[]).await.unwrap();

        let first = mux.apply(frame("job-1", Some(7), Some(0), "abc", false)).await;
        let second = mux.apply(frame("job-1", Some(7), Some(0), "abc", false)).await;
        match (first, second) {
            (ApplyOutcome::Ok { offset: a }, ApplyOutcome::Ok { offset: b }) => assert_eq!(a, b),
            other => panic!("unexpected outcomes: {:?}", other),
        }
    }

    #[tokio::test]
    async fn cumulative_shorter_than_committed_is_offset_mismatch() {
        let (_client, mux) = multiplexer().await;
        let jobs = jobs_for_test(&mux).await;
        jobs.create("job-1", "u1", "llama3.2", &[]).await.unwrap();

        mux.apply(frame("job-1", None, Some(0), "hello", false)).await;

        let shorter_cumulative = ProducerFrame {
            job_id: "job-1".to_string(),
            seq: None,
            offset: None,
            delta: None,
            cumulative: Some("he".to_string()),
            chunk: None,
            content_type: ContentType::Response,
            reasoning: None,
            done: false,
        };
        let outcome = mux.apply(shorter_cumulative).await;
        assert!(matches!(outcome, ApplyOutcome::OffsetMismatch { .. }));
    }

    #[tokio::test]
    async fn late_subscriber_receives_single_backlog_frame() {
        let (_client, mux) = multiplexer().await;
        let jobs = jobs_for_test(&mux).await;
        jobs.create("job-1", "u1", "llama3.2", &[]).await.unwrap();

        mux.apply(frame("job-1", None, Some(0), "hello", false)).await;

        let (sender, mut receiver) = mpsc::channel(8);
        let (_subscriber_id, backlog_sent) = mux.attach_subscriber("job-1", Some(0), sender).await;
        assert!(backlog_sent, "attaching behind the committed offset must report backlog was sent");

        let event = receiver.recv().await.expect("backlog frame expected");
        match event {
            SubscriberEvent::Delta { delta, .. } => assert_eq!(delta, "hello"),
            other => panic!("expected Delta backlog, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn attach_at_current_offset_sends_no_backlog() {
        let (_client, mux) = multiplexer().await;
        let jobs = jobs_for_test(&mux).await;
        jobs.create("job-1", "u1", "llama3.2", &[]).await.unwrap();

        mux.apply(frame("job-1", None, Some(0), "hello", false)).await;

        let (sender, mut receiver) = mpsc::channel(8);
        let (_subscriber_id, backlog_sent) = mux.attach_subscriber("job-1", Some(5), sender).await;
        assert!(!backlog_sent, "attaching at the committed offset must not report backlog");

        mux.apply(frame("job-1", None, Some(5), "!", false)).await;
        let event = receiver.recv().await.expect("live frame expected");
        match event {
            SubscriberEvent::Delta { delta, .. } => assert_eq!(delta, "!"),
            other => panic!("expected live Delta, got {:?}", other),
        }
    }

    async fn jobs_for_test(mux: &StreamMultiplexer) -> Arc<JobRepository> {
        mux.job_repo.clone()
    }
}
