// [apps/gateway/tests/push_dispatch_flow.rs]
//! End-to-end push delivery (spec §8 scenario S1) and worker-disconnect
//! handling (S6), exercised through the public handler/service surface
//! rather than the lower-level unit tests colocated with each module.

use relay_domain::job::{ChatMessage, JobStatus};
use relay_domain::stream::{ProducerFrame, ServerFrame, SubscriberEvent};
use relay_gateway::services::dispatch::DispatchEngine;
use relay_gateway::state::stream_multiplexer::FinalizeOutcome;
use relay_gateway::state::AppState;
use std::collections::BTreeSet;
use tokio::sync::mpsc;

async fn fresh_state() -> AppState {
    let store = relay_store::StoreClient::connect(":memory:", None).await.unwrap();
    AppState::new(store).unwrap()
}

#[tokio::test]
async fn push_worker_streams_tokens_and_a_receipt_is_appended() {
    let state = fresh_state().await;
    state.registry.register("w1", BTreeSet::from(["llama3.2".to_string()]), None, None);
    let (push_sender, mut push_receiver) = mpsc::channel(8);
    state.registry.attach_push_channel("w1", push_sender);

    let (subscriber_sender, mut subscriber_receiver) = mpsc::channel(16);
    let messages = vec![ChatMessage { role: "user".into(), content: "hi".into() }];

    let job_id = DispatchEngine::dispatch(&state, "u1", "llama3.2", messages, None, subscriber_sender).await.unwrap();

    let envelope = push_receiver.recv().await.expect("worker should receive the job envelope");
    match envelope {
        ServerFrame::Job { job_id: envelope_job_id, .. } => assert_eq!(envelope_job_id, job_id),
        other => panic!("unexpected envelope: {other:?}"),
    }

    // Worker streams three frames exactly as S1 describes.
    for (delta, done) in [("he", false), ("llo", false), (" \u{1F44B}", true)] {
        let outcome = state
            .streams
            .apply(ProducerFrame {
                job_id: job_id.clone(),
                seq: None,
                offset: None,
                delta: Some(delta.to_string()),
                cumulative: None,
                chunk: None,
                content_type: relay_domain::stream::ContentType::Response,
                reasoning: None,
                done,
            })
            .await;
        assert!(matches!(outcome, relay_domain::stream::ApplyOutcome::Ok { .. }));
    }

    let mut deltas = Vec::new();
    while let Ok(event) = subscriber_receiver.try_recv() {
        match event {
            SubscriberEvent::Delta { delta, .. } => deltas.push(delta),
            SubscriberEvent::Done { .. } => break,
            _ => {}
        }
    }
    assert_eq!(deltas, vec!["he".to_string(), "llo".to_string(), " \u{1F44B}".to_string()]);

    let job = state.jobs.get(&job_id).await.unwrap().expect("job persisted");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.response.as_deref(), Some("hello \u{1F44B}"));

    let receipts = state.receipts.list_page("u1", 10, 0).await.unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].block_number, 1);
    assert!(receipts[0].previous_hash.is_none());
}

#[tokio::test]
async fn worker_disconnect_mid_stream_fails_the_job_without_a_receipt() {
    let state = fresh_state().await;
    state.registry.register("w1", BTreeSet::from(["llama3.2".to_string()]), None, None);
    let (push_sender, _push_receiver) = mpsc::channel(8);
    state.registry.attach_push_channel("w1", push_sender);

    let (subscriber_sender, mut subscriber_receiver) = mpsc::channel(16);
    let job_id = DispatchEngine::dispatch(&state, "u1", "llama3.2", vec![], None, subscriber_sender).await.unwrap();

    state
        .streams
        .apply(ProducerFrame {
            job_id: job_id.clone(),
            seq: None,
            offset: None,
            delta: Some("partial".into()),
            cumulative: None,
            chunk: None,
            content_type: relay_domain::stream::ContentType::Response,
            reasoning: None,
            done: false,
        })
        .await;

    // The worker's socket drops; the sweep daemon would normally detect this
    // on its next tick and finalize every job that worker was carrying.
    state.registry.detach_push_channel("w1");
    state.streams.finalize(&job_id, FinalizeOutcome::Failed { error: "worker_disconnected".to_string() }).await;
    state.registry.release_job("w1", &job_id);

    let job = state.jobs.get(&job_id).await.unwrap().expect("job persisted");
    assert_eq!(job.status, JobStatus::Failed);

    let mut saw_error = false;
    while let Ok(event) = subscriber_receiver.try_recv() {
        if let SubscriberEvent::Error { error } = event {
            assert_eq!(error, "worker_disconnected");
            saw_error = true;
        }
    }
    assert!(saw_error, "subscriber should observe a terminal error frame");

    let receipts = state.receipts.list_page("u1", 10, 0).await.unwrap();
    assert!(receipts.is_empty(), "a failed job must never produce a receipt");
}
