// [apps/gateway/src/state/receipt_chain.rs]
/*!
 * =================================================================
 * APARATO: RECEIPT CHAIN (V1.0)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L3)
 * RESPONSABILIDAD: SERIALIZACIÓN POR USUARIO Y ENLACE DE BLOQUES
 *
 * The hashing itself is a pure function in `relay_domain::receipt`; this
 * module adds the one thing a database table cannot give for free —
 * atomicity of "read latest, compute, append" per user (spec §4.F:
 * "two concurrent appends for the same user must serialize"). A
 * `tokio::sync::Mutex` keyed by user id is the serialization primitive,
 * mirroring the donor's per-user lock strata for identity leases.
 * =================================================================
 */

use chrono::Utc;
use relay_domain::job::{canonical_message_bytes, ChatMessage};
use relay_domain::receipt::{compute_block_hash, sha256_hex, verify_chain, Receipt, ReceiptStatus, VerifyResult};
use relay_store::{JobRepository, ReceiptRepository, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

pub struct ReceiptChain {
    repository: ReceiptRepository,
    job_repo: Option<Arc<JobRepository>>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ReceiptChain {
    /// `job_repo` is optional so the pure append/verify path stays
    /// testable without a job store; the gateway's composition root
    /// always supplies one, which is what lets `on_job_completed` work.
    pub fn new(repository: ReceiptRepository) -> Self {
        Self { repository, job_repo: None, user_locks: Mutex::new(HashMap::new()) }
    }

    pub fn with_job_repository(mut self, job_repo: Arc<JobRepository>) -> Self {
        self.job_repo = Some(job_repo);
        self
    }

    async fn lock_for_user(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks.entry(user_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Appends a receipt for a successfully completed inference (spec
    /// §4.F). Serialized per user so `previous_hash` always links to the
    /// true latest block.
    pub async fn append(
        &self,
        user_id: &str,
        inference_id: &str,
        worker_id: Option<&str>,
        model: &str,
        messages: &[ChatMessage],
        response: &str,
        processing_time_ms: u64,
        token_count: u64,
    ) -> Result<Receipt, StoreError> {
        let user_lock = self.lock_for_user(user_id).await;
        let _guard = user_lock.lock().await;

        let latest = self.repository.latest_for_user(user_id).await?;
        let (previous_hash, next_block_number) = match latest {
            Some((hash, number)) => (Some(hash), number + 1),
            None => (None, 1),
        };

        let request_hash = sha256_hex(&canonical_message_bytes(messages));
        let response_hash = sha256_hex(response.as_bytes());
        let timestamp = Utc::now();
        let block_hash = compute_block_hash(user_id, inference_id, &request_hash, &response_hash, previous_hash.as_deref(), timestamp);

        let receipt = Receipt {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            inference_id: inference_id.to_string(),
            worker_id: worker_id.map(str::to_string),
            model: model.to_string(),
            request_hash,
            response_hash,
            previous_hash,
            block_hash,
            block_number: next_block_number,
            status: ReceiptStatus::Completed,
            processing_time_ms,
            token_count,
            timestamp,
        };

        self.repository.append(&receipt).await?;
        info!("🧾 [RECEIPT_CHAIN]: Appended block {} for user [{}]", receipt.block_number, user_id);
        Ok(receipt)
    }

    /// Convenience entry point used by the stream multiplexer on terminal
    /// success: looks up the job's own metadata to assemble the fields
    /// `append` needs. A job lookup failure here is logged but never
    /// aborts the stream's completion — per spec §7, receipt failures
    /// never unwind dispatch.
    pub async fn on_job_completed(&self, job_id: &str, response: &str) {
        let Some(job_repo) = &self.job_repo else {
            warn!("🧾 [RECEIPT_CHAIN]: No job repository wired, skipping receipt for [{}]", job_id);
            return;
        };

        let job = match job_repo.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("🧾 [RECEIPT_CHAIN]: Job [{}] vanished before receipt could be appended", job_id);
                return;
            }
            Err(error) => {
                warn!("🧾 [RECEIPT_CHAIN]: Failed to load job [{}] for receipt: {}", job_id, error);
                return;
            }
        };

        let processing_time_ms = (Utc::now() - job.created_at).num_milliseconds().max(0) as u64;
        let token_count = response.chars().count() as u64;

        if let Err(error) = self
            .append(&job.user_id, job_id, job.assigned_worker.as_deref(), &job.model, &job.messages, response, processing_time_ms, token_count)
            .await
        {
            warn!("🧾 [RECEIPT_CHAIN]: Failed to append receipt for job [{}]: {}", job_id, error);
        }
    }

    pub async fn verify(&self, user_id: &str) -> Result<VerifyResult, StoreError> {
        let receipts = self.repository.list_all_for_user(user_id).await?;
        Ok(verify_chain(&receipts))
    }

    pub async fn list_page(&self, user_id: &str, limit: u32, offset: u32) -> Result<Vec<Receipt>, StoreError> {
        self.repository.list_for_user(user_id, limit, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::StoreClient;

    async fn chain() -> (StoreClient, ReceiptChain) {
        let client = StoreClient::connect(":memory:", None).await.unwrap();
        let repo = ReceiptRepository::new(client.get_connection().unwrap());
        (client, ReceiptChain::new(repo))
    }

    #[tokio::test]
    async fn sequential_appends_link_correctly() {
        let (_client, chain) = chain().await;
        let messages = vec![ChatMessage { role: "user".into(), content: "hi".into() }];

        let r1 = chain.append("u1", "job-1", Some("w1"), "llama3.2", &messages, "hello", 10, 2).await.unwrap();
        assert_eq!(r1.block_number, 1);
        assert!(r1.previous_hash.is_none());

        let r2 = chain.append("u1", "job-2", Some("w1"), "llama3.2", &messages, "world", 12, 2).await.unwrap();
        assert_eq!(r2.block_number, 2);
        assert_eq!(r2.previous_hash.as_deref(), Some(r1.block_hash.as_str()));

        let verification = chain.verify("u1").await.unwrap();
        assert!(verification.chain_valid);
    }

    #[tokio::test]
    async fn concurrent_appends_for_same_user_serialize_into_a_valid_chain() {
        let (_client, chain) = chain().await;
        let chain = Arc::new(chain);
        let messages = vec![ChatMessage { role: "user".into(), content: "hi".into() }];

        let mut handles = Vec::new();
        for i in 0..8 {
            let chain = chain.clone();
            let messages = messages.clone();
            handles.push(tokio::spawn(async move {
                chain.append("u1", &format!("job-{i}"), None, "llama3.2", &messages, "resp", 1, 1).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let verification = chain.verify("u1").await.unwrap();
        assert!(verification.chain_valid, "{}", verification.message);
    }
}
