// [libs/infra/db/tests/receipt_store.rs]
//! Receipt repository persistence certification (spec §4.F, §8 invariant 3).

use relay_domain::receipt::{compute_block_hash, sha256_hex, verify_chain, Receipt, ReceiptStatus};
use relay_store::{ReceiptRepository, StoreClient};

async fn repo() -> (StoreClient, ReceiptRepository) {
    let client = StoreClient::connect(":memory:", None).await.unwrap();
    let connection = client.get_connection().unwrap();
    (client, ReceiptRepository::new(connection))
}

fn build_receipt(block_number: u64, previous_hash: Option<String>, seed: &str) -> Receipt {
    let timestamp = chrono::Utc::now();
    let request_hash = sha256_hex(b"request");
    let response_hash = sha256_hex(seed.as_bytes());
    let block_hash = compute_block_hash(
        "u1",
        "job-1",
        &request_hash,
        &response_hash,
        previous_hash.as_deref(),
        timestamp,
    );
    Receipt {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: "u1".into(),
        inference_id: "job-1".into(),
        worker_id: Some("w1".into()),
        model: "llama3.2".into(),
        request_hash,
        response_hash,
        previous_hash,
        block_hash,
        block_number,
        status: ReceiptStatus::Completed,
        processing_time_ms: 42,
        token_count: 7,
        timestamp,
    }
}

#[tokio::test]
async fn latest_for_user_is_none_before_any_receipt() {
    let (_client, repo) = repo().await;
    assert!(repo.latest_for_user("u1").await.unwrap().is_none());
}

#[tokio::test]
async fn append_then_list_round_trips_and_verifies() {
    let (_client, repo) = repo().await;

    let r1 = build_receipt(1, None, "resp-1");
    repo.append(&r1).await.unwrap();

    let latest = repo.latest_for_user("u1").await.unwrap().unwrap();
    assert_eq!(latest, (r1.block_hash.clone(), 1));

    let r2 = build_receipt(2, Some(latest.0), "resp-2");
    repo.append(&r2).await.unwrap();

    let chain = repo.list_all_for_user("u1").await.unwrap();
    assert_eq!(chain.len(), 2);
    assert!(verify_chain(&chain).chain_valid);
}
