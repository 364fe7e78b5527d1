// [libs/infra/db/src/repositories/job/queries.rs]
//! SQL constants for the job ledger (spec §4.C).

pub const INSERT_JOB: &str = r#"
    INSERT INTO jobs (id, user_id, model, messages_json, status, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)
"#;

/// Oldest eligible pending job for a model, FIFO by `created_at` with an
/// id tie-break (spec §4.C "Ordering is FIFO by creation instant ...
/// ties broken by identifier").
pub const FIND_CLAIMABLE_JOB: &str = r#"
    SELECT id FROM jobs
    WHERE status = 'pending' AND model = ?1
    ORDER BY created_at ASC, id ASC
    LIMIT 1
"#;

/// Conditional claim: only succeeds if the job is still `pending` at the
/// moment of the update, which is how the transaction enforces
/// "exactly one success" under concurrent claims (spec §4.C).
pub const CLAIM_JOB: &str = r#"
    UPDATE jobs
    SET status = 'assigned', assigned_worker = ?1, updated_at = ?2
    WHERE id = ?3 AND status = 'pending'
"#;

pub const UPDATE_STATUS: &str = r#"
    UPDATE jobs
    SET status = ?1, response = ?2, error = ?3, updated_at = ?4
    WHERE id = ?5
"#;

pub const GET_JOB: &str = r#"
    SELECT id, user_id, model, messages_json, status, assigned_worker, response, error, created_at, updated_at
    FROM jobs
    WHERE id = ?1
"#;
