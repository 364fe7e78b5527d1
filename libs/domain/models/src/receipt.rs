// [libs/domain/models/src/receipt.rs]
//! Hash-linked receipt chain types and pure hashing logic (spec §3
//! "Receipt", §4.F "Receipt Chain"). The hash computation lives here
//! (not in `relay-store`) so it is usable, and testable, without a
//! database: both the chain's append path and its offline `verify`
//! recompute through the same function.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub user_id: String,
    pub inference_id: String,
    pub worker_id: Option<String>,
    pub model: String,
    pub request_hash: String,
    pub response_hash: String,
    pub previous_hash: Option<String>,
    pub block_hash: String,
    pub block_number: u64,
    pub status: ReceiptStatus,
    pub processing_time_ms: u64,
    pub token_count: u64,
    /// Single instant used for both hashing and storage (spec §4.F step 3
    /// — "critical for later verification").
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// SHA-256 of arbitrary bytes, hex-encoded. Shared by `request_hash`,
/// `response_hash`, and `block_hash` computation.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// Computes `block_hash` per spec §4.F step 4: SHA-256 over
/// `user | inference_id | request_hash | response_hash | (previous_hash or
/// "genesis") | timestamp_iso8601`, with `|` meaning ASCII colon joining.
pub fn compute_block_hash(
    user_id: &str,
    inference_id: &str,
    request_hash: &str,
    response_hash: &str,
    previous_hash: Option<&str>,
    timestamp: chrono::DateTime<chrono::Utc>,
) -> String {
    let previous = previous_hash.unwrap_or("genesis");
    let joined = format!(
        "{}:{}:{}:{}:{}:{}",
        user_id,
        inference_id,
        request_hash,
        response_hash,
        previous,
        timestamp.to_rfc3339(),
    );
    sha256_hex(joined.as_bytes())
}

/// Recomputes and compares a receipt's `block_hash` against its stored
/// fields (spec §3 invariant, §4.F `verify`).
pub fn recompute_block_hash(receipt: &Receipt) -> String {
    compute_block_hash(
        &receipt.user_id,
        &receipt.inference_id,
        &receipt.request_hash,
        &receipt.response_hash,
        receipt.previous_hash.as_deref(),
        receipt.timestamp,
    )
}

/// Outcome of chain verification (spec §4.F, §6 `/receipts/verify`).
#[derive(Debug, Clone, Serialize)]
pub struct VerifyResult {
    pub chain_valid: bool,
    pub message: String,
}

/// Verifies a user's receipt list, already sorted by `block_number`
/// ascending (spec §4.F `verify`, §8 invariant 3). Pure function over the
/// in-memory list so it is independent of how the list was loaded.
pub fn verify_chain(receipts: &[Receipt]) -> VerifyResult {
    let mut previous: Option<&Receipt> = None;

    for (index, receipt) in receipts.iter().enumerate() {
        if recompute_block_hash(receipt) != receipt.block_hash {
            return VerifyResult {
                chain_valid: false,
                message: format!(
                    "block_hash mismatch at block_number {}",
                    receipt.block_number
                ),
            };
        }

        match previous {
            None => {
                if receipt.previous_hash.is_some() {
                    return VerifyResult {
                        chain_valid: false,
                        message: format!(
                            "first receipt (block_number {}) has a non-nil previous_hash",
                            receipt.block_number
                        ),
                    };
                }
            }
            Some(prior) => {
                if receipt.previous_hash.as_deref() != Some(prior.block_hash.as_str()) {
                    return VerifyResult {
                        chain_valid: false,
                        message: format!(
                            "previous_hash break at block_number {} (index {})",
                            receipt.block_number, index
                        ),
                    };
                }
            }
        }

        previous = Some(receipt);
    }

    VerifyResult {
        chain_valid: true,
        message: "chain valid".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_receipt(
        block_number: u64,
        previous_hash: Option<String>,
        response_hash: &str,
    ) -> Receipt {
        let timestamp = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let request_hash = sha256_hex(b"request");
        let block_hash = compute_block_hash(
            "u1",
            "job-1",
            &request_hash,
            response_hash,
            previous_hash.as_deref(),
            timestamp,
        );
        Receipt {
            id: format!("r{}", block_number),
            user_id: "u1".into(),
            inference_id: "job-1".into(),
            worker_id: None,
            model: "llama3.2".into(),
            request_hash,
            response_hash: response_hash.into(),
            previous_hash,
            block_hash,
            block_number,
            status: ReceiptStatus::Completed,
            processing_time_ms: 10,
            token_count: 3,
            timestamp,
        }
    }

    #[test]
    fn verify_after_create_passes() {
        let response_hash_1 = sha256_hex(b"resp-1");
        let r1 = make_receipt(1, None, &response_hash_1);
        let response_hash_2 = sha256_hex(b"resp-2");
        let r2 = make_receipt(2, Some(r1.block_hash.clone()), &response_hash_2);
        let response_hash_3 = sha256_hex(b"resp-3");
        let r3 = make_receipt(3, Some(r2.block_hash.clone()), &response_hash_3);

        let result = verify_chain(&[r1, r2, r3]);
        assert!(result.chain_valid);
    }

    #[test]
    fn tampered_block_fails_verification() {
        let response_hash_1 = sha256_hex(b"resp-1");
        let r1 = make_receipt(1, None, &response_hash_1);
        let response_hash_2 = sha256_hex(b"resp-2");
        let mut r2 = make_receipt(2, Some(r1.block_hash.clone()), &response_hash_2);
        let response_hash_3 = sha256_hex(b"resp-3");
        let r3 = make_receipt(3, Some(r2.block_hash.clone()), &response_hash_3);

        // Tamper the middle receipt's response_hash without recomputing its block_hash.
        r2.response_hash = sha256_hex(b"tampered");

        let result = verify_chain(&[r1, r2, r3]);
        assert!(!result.chain_valid);
    }

    #[test]
    fn genesis_receipt_has_no_previous_hash() {
        let response_hash = sha256_hex(b"resp-1");
        let r1 = make_receipt(1, None, &response_hash);
        assert!(r1.previous_hash.is_none());
        assert_eq!(recompute_block_hash(&r1), r1.block_hash);
    }
}
