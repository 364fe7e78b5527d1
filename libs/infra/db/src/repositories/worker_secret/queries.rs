// [libs/infra/db/src/repositories/worker_secret/queries.rs]
//! SQL constants for the worker secret vault (spec §3 "Worker Secret").

pub const UPSERT_SECRET: &str = r#"
    INSERT INTO worker_secrets (worker_id, secret_hex, created_at, rotated_at)
    VALUES (?1, ?2, ?3, ?3)
    ON CONFLICT(worker_id) DO UPDATE SET secret_hex = excluded.secret_hex, rotated_at = excluded.rotated_at
"#;

pub const GET_SECRET: &str = r#"
    SELECT secret_hex FROM worker_secrets WHERE worker_id = ?1
"#;

pub const DELETE_SECRET: &str = r#"
    DELETE FROM worker_secrets WHERE worker_id = ?1
"#;
