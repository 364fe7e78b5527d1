// [libs/infra/db/src/repositories/receipt/mod.rs]
/*!
 * =================================================================
 * APARATO: RECEIPT REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DE LA CADENA DE RECIBOS POR USUARIO
 *
 * Nota de diseño: este repositorio NO decide qué `previous_hash` usar ni
 * calcula `block_hash` — eso es responsabilidad de la cadena de recibos
 * en la capa de aplicación (`apps/gateway`), que serializa los append por
 * usuario con un mutex en proceso antes de llamar a `append`. El
 * repositorio solo persiste y recupera.
 * =================================================================
 */

pub mod queries;

use crate::errors::StoreError;
use libsql::params;
use relay_domain::receipt::{Receipt, ReceiptStatus};
use self::queries as sql;

pub struct ReceiptRepository {
    database_connection: libsql::Connection,
}

impl ReceiptRepository {
    pub fn new(connection: libsql::Connection) -> Self {
        Self { database_connection: connection }
    }

    /// The immediately prior receipt's `block_hash` and `block_number` for
    /// a user, or `None` if the chain is empty (spec §4.F step 1).
    pub async fn latest_for_user(&self, user_id: &str) -> Result<Option<(String, u64)>, StoreError> {
        let mut rows = self
            .database_connection
            .query(sql::GET_LATEST_FOR_USER, params![user_id])
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let block_hash: String = row.get(0)?;
        let block_number: i64 = row.get(1)?;
        Ok(Some((block_hash, block_number as u64)))
    }

    pub async fn append(&self, receipt: &Receipt) -> Result<(), StoreError> {
        self.database_connection
            .execute(
                sql::INSERT_RECEIPT,
                params![
                    receipt.id.as_str(),
                    receipt.user_id.as_str(),
                    receipt.inference_id.as_str(),
                    receipt.worker_id.as_deref(),
                    receipt.model.as_str(),
                    receipt.request_hash.as_str(),
                    receipt.response_hash.as_str(),
                    receipt.previous_hash.as_deref(),
                    receipt.block_hash.as_str(),
                    receipt.block_number as i64,
                    status_as_str(receipt.status),
                    receipt.processing_time_ms as i64,
                    receipt.token_count as i64,
                    receipt.timestamp.to_rfc3339(),
                ],
            )
            .await?;
        Ok(())
    }

    /// Paginated listing for `GET /receipts` (spec §6).
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Receipt>, StoreError> {
        let mut rows = self
            .database_connection
            .query(sql::LIST_FOR_USER, params![user_id, limit, offset])
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(map_row(row)?);
        }
        Ok(out)
    }

    /// Full chain for `GET /receipts/verify` (spec §4.F `verify`).
    pub async fn list_all_for_user(&self, user_id: &str) -> Result<Vec<Receipt>, StoreError> {
        let mut rows = self
            .database_connection
            .query(sql::LIST_ALL_FOR_USER_ORDERED, params![user_id])
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(map_row(row)?);
        }
        Ok(out)
    }
}

fn status_as_str(status: ReceiptStatus) -> &'static str {
    match status {
        ReceiptStatus::Completed => "completed",
        ReceiptStatus::Failed => "failed",
    }
}

fn parse_status(raw: &str) -> Result<ReceiptStatus, StoreError> {
    match raw {
        "completed" => Ok(ReceiptStatus::Completed),
        "failed" => Ok(ReceiptStatus::Failed),
        other => Err(StoreError::MappingError(format!("unknown receipt status {}", other))),
    }
}

fn map_row(row: libsql::Row) -> Result<Receipt, StoreError> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let inference_id: String = row.get(2)?;
    let worker_id: Option<String> = row.get(3)?;
    let model: String = row.get(4)?;
    let request_hash: String = row.get(5)?;
    let response_hash: String = row.get(6)?;
    let previous_hash: Option<String> = row.get(7)?;
    let block_hash: String = row.get(8)?;
    let block_number: i64 = row.get(9)?;
    let status_text: String = row.get(10)?;
    let processing_time_ms: i64 = row.get(11)?;
    let token_count: i64 = row.get(12)?;
    let timestamp_text: String = row.get(13)?;

    let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp_text)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| StoreError::MappingError(format!("bad timestamp {}: {}", timestamp_text, e)))?;

    Ok(Receipt {
        id,
        user_id,
        inference_id,
        worker_id,
        model,
        request_hash,
        response_hash,
        previous_hash,
        block_hash,
        block_number: block_number as u64,
        status: parse_status(&status_text)?,
        processing_time_ms: processing_time_ms as u64,
        token_count: token_count as u64,
        timestamp,
    })
}
