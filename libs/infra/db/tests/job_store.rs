// [libs/infra/db/tests/job_store.rs]
//! Job ledger lifecycle certification (spec §4.C, §8 boundary behaviors).

use relay_domain::job::{ChatMessage, JobStatus};
use relay_store::{JobRepository, StoreClient};

async fn repo() -> (StoreClient, JobRepository) {
    let client = StoreClient::connect(":memory:", None)
        .await
        .expect("in-memory store should connect");
    let connection = client.get_connection().expect("connection");
    (client, JobRepository::new(connection))
}

fn messages() -> Vec<ChatMessage> {
    vec![ChatMessage { role: "user".into(), content: "hi".into() }]
}

#[tokio::test]
async fn create_then_get_round_trips() {
    let (_client, repo) = repo().await;
    let job = repo.create("job-1", "u1", "llama3.2", &messages()).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let fetched = repo.get("job-1").await.unwrap().expect("job exists");
    assert_eq!(fetched.user_id, "u1");
    assert_eq!(fetched.model, "llama3.2");
}

#[tokio::test]
async fn claim_next_on_empty_queue_is_none_without_side_effect() {
    let (_client, repo) = repo().await;
    let claimed = repo.claim_next("w1", &["llama3.2".to_string()]).await.unwrap();
    assert!(claimed.is_none());
}

#[tokio::test]
async fn claim_next_selects_oldest_matching_model_fifo() {
    let (_client, repo) = repo().await;
    repo.create("job-a", "u1", "llama3.2", &messages()).await.unwrap();
    repo.create("job-b", "u1", "llama3.2", &messages()).await.unwrap();
    repo.create("job-c", "u1", "mistral", &messages()).await.unwrap();

    let claimed = repo
        .claim_next("w1", &["llama3.2".to_string()])
        .await
        .unwrap()
        .expect("a pending llama3.2 job exists");

    assert_eq!(claimed.id, "job-a");
    assert_eq!(claimed.status, JobStatus::Assigned);
    assert_eq!(claimed.assigned_worker.as_deref(), Some("w1"));

    let second = repo
        .claim_next("w2", &["llama3.2".to_string()])
        .await
        .unwrap()
        .expect("job-b is still pending");
    assert_eq!(second.id, "job-b");
}

#[tokio::test]
async fn claim_next_does_not_reassign_an_already_assigned_job() {
    let (_client, repo) = repo().await;
    repo.create("job-a", "u1", "llama3.2", &messages()).await.unwrap();

    let first = repo.claim_next("w1", &["llama3.2".to_string()]).await.unwrap();
    assert!(first.is_some());

    let second = repo.claim_next("w2", &["llama3.2".to_string()]).await.unwrap();
    assert!(second.is_none(), "job-a was already claimed, queue is now empty");
}

#[tokio::test]
async fn update_status_rejects_transition_out_of_terminal_state() {
    let (_client, repo) = repo().await;
    repo.create("job-a", "u1", "llama3.2", &messages()).await.unwrap();

    repo.update_status("job-a", JobStatus::Completed, Some("hello"), None)
        .await
        .unwrap();

    let result = repo
        .update_status("job-a", JobStatus::Failed, None, Some("late error"))
        .await;
    assert!(result.is_err(), "terminal state must reject further transitions");
}
