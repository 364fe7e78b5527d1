// [libs/infra/db/src/repositories/worker_secret/mod.rs]
/*!
 * =================================================================
 * APARATO: WORKER SECRET VAULT
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DURADERA DE CREDENCIALES HMAC
 *
 * Sobrevive a reinicios del control plane: el registro de workers en RAM
 * se reconstruye desde cero en cada arranque (spec §9 "Global mutable
 * state"), pero las credenciales HMAC deben seguir siendo válidas para
 * que un worker que reconecta no necesite volver a registrarse.
 * =================================================================
 */

pub mod queries;

use crate::errors::StoreError;
use libsql::params;
use self::queries as sql;

pub struct WorkerSecretRepository {
    database_connection: libsql::Connection,
}

impl WorkerSecretRepository {
    pub fn new(connection: libsql::Connection) -> Self {
        Self { database_connection: connection }
    }

    /// Mints or rotates a worker's secret (spec §4.B "repeat registration
    /// rotates the secret").
    pub async fn upsert(&self, worker_id: &str, secret_hex: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now().to_rfc3339();
        self.database_connection
            .execute(sql::UPSERT_SECRET, params![worker_id, secret_hex, now])
            .await?;
        Ok(())
    }

    pub async fn get(&self, worker_id: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .database_connection
            .query(sql::GET_SECRET, params![worker_id])
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(row.get(0)?))
    }

    pub async fn revoke(&self, worker_id: &str) -> Result<(), StoreError> {
        self.database_connection
            .execute(sql::DELETE_SECRET, params![worker_id])
            .await?;
        Ok(())
    }
}
