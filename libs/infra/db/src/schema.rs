// [libs/infra/db/src/schema.rs]
/**
 * =================================================================
 * APARATO: SOVEREIGN DATABASE SCHEMA
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL E IDEMPOTENCIA TOTAL
 * =================================================================
 */

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument};

const TACTICAL_TABLES: &[(&str, &str)] = &[
    ("TABLE_JOBS", r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            model TEXT NOT NULL,
            messages_json TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            assigned_worker TEXT,
            response TEXT,
            error TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );
    "#),
    ("TABLE_RECEIPTS", r#"
        CREATE TABLE IF NOT EXISTS receipts (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            inference_id TEXT NOT NULL,
            worker_id TEXT,
            model TEXT NOT NULL,
            request_hash TEXT NOT NULL,
            response_hash TEXT NOT NULL,
            previous_hash TEXT,
            block_hash TEXT NOT NULL,
            block_number INTEGER NOT NULL,
            status TEXT NOT NULL,
            processing_time_ms INTEGER NOT NULL,
            token_count INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            UNIQUE(user_id, block_number)
        );
    "#),
    ("TABLE_WORKER_SECRETS", r#"
        CREATE TABLE IF NOT EXISTS worker_secrets (
            worker_id TEXT PRIMARY KEY,
            secret_hex TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            rotated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );
    "#),
];

const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("IDX_JOBS_CLAIM", "CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs(status, model, created_at, id);"),
    ("IDX_RECEIPTS_USER", "CREATE INDEX IF NOT EXISTS idx_receipts_user ON receipts(user_id, block_number);"),
];

/**
 * Ejecuta la secuencia maestra de sincronización del esquema estructural.
 */
#[instrument(skip(database_connection))]
pub async fn apply_full_schema(database_connection: &Connection) -> Result<()> {
    info!("🏗️ [SCHEMA_ENGINE]: Initiating structural synchronization...");

    for (identifier, sql) in TACTICAL_TABLES {
        debug!("  ↳ Solidifying: {}", identifier);
        database_connection
            .execute(*sql, ())
            .await
            .with_context(|| format!("CRITICAL_SOLIDIFICATION_FAULT: {}", identifier))?;
    }

    for (identifier, sql) in ACCELERATION_INDEXES {
        debug!("  ↳ Hardening: {}", identifier);
        database_connection
            .execute(*sql, ())
            .await
            .with_context(|| format!("CRITICAL_HARDENING_FAULT: {}", identifier))?;
    }

    info!("✅ [SCHEMA_ENGINE]: Ledger solidified and certified.");
    Ok(())
}
