// [libs/infra/db/src/repositories/receipt/queries.rs]
//! SQL constants for the per-user receipt chain (spec §4.F).

pub const GET_LATEST_FOR_USER: &str = r#"
    SELECT block_hash, block_number FROM receipts
    WHERE user_id = ?1
    ORDER BY block_number DESC
    LIMIT 1
"#;

pub const INSERT_RECEIPT: &str = r#"
    INSERT INTO receipts (
        id, user_id, inference_id, worker_id, model,
        request_hash, response_hash, previous_hash, block_hash, block_number,
        status, processing_time_ms, token_count, timestamp
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
"#;

pub const LIST_FOR_USER: &str = r#"
    SELECT id, user_id, inference_id, worker_id, model,
           request_hash, response_hash, previous_hash, block_hash, block_number,
           status, processing_time_ms, token_count, timestamp
    FROM receipts
    WHERE user_id = ?1
    ORDER BY block_number ASC
    LIMIT ?2 OFFSET ?3
"#;

pub const LIST_ALL_FOR_USER_ORDERED: &str = r#"
    SELECT id, user_id, inference_id, worker_id, model,
           request_hash, response_hash, previous_hash, block_hash, block_number,
           status, processing_time_ms, token_count, timestamp
    FROM receipts
    WHERE user_id = ?1
    ORDER BY block_number ASC
"#;
