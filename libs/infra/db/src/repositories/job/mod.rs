// [libs/infra/db/src/repositories/job/mod.rs]
/*!
 * =================================================================
 * APARATO: JOB REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GESTIÓN DEL CICLO DE VIDA DE ÓRDENES DE TRABAJO
 *
 * # Mathematical Proof (Transactional Exclusivity):
 * `claim_next` encapsula la búsqueda del candidato elegible y la
 * actualización condicional de su propiedad dentro de una única
 * transacción; la cláusula `WHERE status = 'pending'` en el UPDATE
 * garantiza que, bajo reclamaciones concurrentes, como máximo una
 * transacción observe una fila afectada.
 * =================================================================
 */

pub mod queries;

use crate::errors::StoreError;
use libsql::{params, Connection};
use relay_domain::job::{ChatMessage, Job, JobStatus};
use self::queries as sql;
use tracing::{info, instrument, warn};

pub struct JobRepository {
    database_connection: Connection,
}

impl JobRepository {
    pub fn new(connection: Connection) -> Self {
        Self { database_connection: connection }
    }

    /// `create(user, model, messages) → job` (spec §4.C).
    #[instrument(skip(self, messages))]
    pub async fn create(
        &self,
        job_id: &str,
        user_id: &str,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<Job, StoreError> {
        let now = chrono::Utc::now();
        let messages_json = serde_json::to_string(messages)
            .map_err(|e| StoreError::MappingError(e.to_string()))?;

        self.database_connection
            .execute(
                sql::INSERT_JOB,
                params![job_id, user_id, model, messages_json, now.to_rfc3339()],
            )
            .await?;

        Ok(Job {
            id: job_id.to_string(),
            user_id: user_id.to_string(),
            model: model.to_string(),
            messages: messages.to_vec(),
            status: JobStatus::Pending,
            assigned_worker: None,
            response: None,
            error: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// `claim_next(worker, worker_models) → job or none` (spec §4.C).
    /// Iterates candidate models because a worker may declare several;
    /// the first model with an eligible pending job wins, preserving the
    /// FIFO-within-model ordering of `FIND_CLAIMABLE_JOB`.
    #[instrument(skip(self, worker_models))]
    pub async fn claim_next(
        &self,
        worker_id: &str,
        worker_models: &[String],
    ) -> Result<Option<Job>, StoreError> {
        for model in worker_models {
            if let Some(job) = self.try_claim_for_model(worker_id, model).await? {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn try_claim_for_model(
        &self,
        worker_id: &str,
        model: &str,
    ) -> Result<Option<Job>, StoreError> {
        let transaction = self
            .database_connection
            .transaction()
            .await
            .map_err(|_| StoreError::TransactionError)?;

        let mut candidate_rows = transaction.query(sql::FIND_CLAIMABLE_JOB, params![model]).await?;
        let Some(row) = candidate_rows.next().await? else {
            transaction.commit().await.map_err(|_| StoreError::TransactionError)?;
            return Ok(None);
        };
        let job_id: String = row.get(0)?;
        drop(candidate_rows);

        let now = chrono::Utc::now();
        let affected = transaction
            .execute(
                sql::CLAIM_JOB,
                params![worker_id, now.to_rfc3339(), job_id.as_str()],
            )
            .await?;

        if affected == 0 {
            // Lost the race to another worker's concurrent claim; no side effect.
            transaction.commit().await.map_err(|_| StoreError::TransactionError)?;
            return Ok(None);
        }

        let job = self.fetch_job_in(&transaction, &job_id).await?;
        transaction.commit().await.map_err(|_| StoreError::TransactionError)?;

        info!("🎯 [CLAIM]: Job [{}] assigned to worker [{}].", job_id, worker_id);
        Ok(Some(job))
    }

    /// Marks a still-pending job `assigned` to `worker_id`, used by the
    /// push delivery path once the gateway has already chosen the worker
    /// (spec §4.D step 4). Shares `CLAIM_JOB`'s conditional `WHERE status
    /// = 'pending'` so a job can never be double-assigned by a push and a
    /// concurrent pull claim.
    #[instrument(skip(self))]
    pub async fn assign_to_worker(&self, job_id: &str, worker_id: &str) -> Result<bool, StoreError> {
        let now = chrono::Utc::now();
        let affected = self
            .database_connection
            .execute(sql::CLAIM_JOB, params![worker_id, now.to_rfc3339(), job_id])
            .await?;
        Ok(affected > 0)
    }

    /// `update_status(job, status, response?, error?)` (spec §4.C).
    /// Rejects transitions out of a terminal state.
    #[instrument(skip(self, response, error))]
    pub async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        response: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let current = self.get(job_id).await?.ok_or(StoreError::JobNotFound)?;
        if current.status.is_terminal() {
            warn!("⛔ [TRANSITION_REJECTED]: Job [{}] is already terminal.", job_id);
            return Err(StoreError::InvalidState);
        }

        let now = chrono::Utc::now();
        let affected = self
            .database_connection
            .execute(
                sql::UPDATE_STATUS,
                params![status.as_str(), response, error, now.to_rfc3339(), job_id],
            )
            .await?;

        if affected == 0 {
            return Err(StoreError::JobNotFound);
        }
        Ok(())
    }

    /// `get(job_id) → job or none` (spec §4.C).
    pub async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let mut rows = self.database_connection.query(sql::GET_JOB, params![job_id]).await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(Self::map_row(row)?))
    }

    async fn fetch_job_in(&self, transaction: &libsql::Transaction, job_id: &str) -> Result<Job, StoreError> {
        let mut rows = transaction.query(sql::GET_JOB, params![job_id]).await?;
        let row = rows.next().await?.ok_or(StoreError::JobNotFound)?;
        Self::map_row(row)
    }

    fn map_row(row: libsql::Row) -> Result<Job, StoreError> {
        let id: String = row.get(0)?;
        let user_id: String = row.get(1)?;
        let model: String = row.get(2)?;
        let messages_json: String = row.get(3)?;
        let status_text: String = row.get(4)?;
        let assigned_worker: Option<String> = row.get(5)?;
        let response: Option<String> = row.get(6)?;
        let error: Option<String> = row.get(7)?;
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;

        let messages: Vec<ChatMessage> = serde_json::from_str(&messages_json)
            .map_err(|e| StoreError::MappingError(e.to_string()))?;
        let status = JobStatus::parse(&status_text)
            .ok_or_else(|| StoreError::MappingError(format!("unknown status {}", status_text)))?;
        let created_at = parse_timestamp(&created_at)?;
        let updated_at = parse_timestamp(&updated_at)?;

        Ok(Job {
            id,
            user_id,
            model,
            messages,
            status,
            assigned_worker,
            response,
            error,
            created_at,
            updated_at,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<chrono::DateTime<chrono::Utc>, StoreError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| StoreError::MappingError(format!("bad timestamp {}: {}", raw, e)))
}
