// [apps/gateway/src/services/dispatch.rs]
/*!
 * =================================================================
 * APARATO: DISPATCH ENGINE (V1.0)
 * CLASIFICACIÓN: APPLICATION SERVICE (ESTRATO L4)
 * RESPONSABILIDAD: ENTREGA PUSH/PULL DE NUEVOS TRABAJOS
 *
 * Implements spec §4.D verbatim: existence check, job creation, stream
 * initialization, then a single best-effort push attempt before falling
 * back to the pull queue.
 * =================================================================
 */

use crate::error::AppError;
use crate::state::AppState;
use relay_domain::job::{ChatMessage, JobStatus};
use relay_domain::stream::{ServerFrame, SubscriberEvent};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

pub struct DispatchEngine;

impl DispatchEngine {
    /// Entry point `dispatch(user, model, messages, subscriber) -> job_id`
    /// (spec §4.D).
    pub async fn dispatch(
        state: &AppState,
        user_id: &str,
        model: &str,
        messages: Vec<ChatMessage>,
        options: Option<serde_json::Value>,
        subscriber: mpsc::Sender<SubscriberEvent>,
    ) -> Result<String, AppError> {
        // Step 1: existence check, independent of idle/push eligibility.
        if !state.registry.has_live_worker_for_model(model) {
            return Err(AppError::no_worker_for_model(model));
        }

        // Step 2: create the job, status `pending`.
        let job_id = Uuid::new_v4().to_string();
        state.jobs.create(&job_id, user_id, model, &messages).await?;

        // Step 3: initialize stream state and attach the caller's subscriber.
        state.streams.attach_subscriber(&job_id, Some(0), subscriber).await;

        // Step 4/5: attempt push delivery; otherwise leave `pending` for pull.
        if let Some((worker_id, push_channel)) = state.registry.try_assign_push(model, &job_id) {
            let envelope = ServerFrame::Job { job_id: job_id.clone(), model: model.to_string(), messages, options };

            if push_channel.send(envelope).await.is_ok() {
                state.jobs.assign_to_worker(&job_id, &worker_id).await?;
                info!("🚀 [DISPATCH]: Job [{}] pushed to worker [{}]", job_id, worker_id);
            } else {
                // Push channel died between selection and send; release the
                // worker and leave the job pending for a polling worker.
                state.registry.release_job(&worker_id, &job_id);
                state.registry.detach_push_channel(&worker_id);
            }
        } else {
            info!("📥 [DISPATCH]: No eligible push worker for job [{}], left pending for poll", job_id);
        }

        Ok(job_id)
    }
}
