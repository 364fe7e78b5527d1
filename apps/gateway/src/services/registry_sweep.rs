// [apps/gateway/src/services/registry_sweep.rs]
/*!
 * =================================================================
 * APARATO: REGISTRY SWEEP DAEMON (V1.0)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: DETECCIÓN DE WORKERS MUERTOS Y FALLO DE SUS TRABAJOS
 *
 * Periodically sweeps the worker registry for stale entries and fails
 * every job they were carrying with `worker_disconnected` (spec §4.B,
 * §7 "Resource — ... terminate worker with stale and fail its in-flight
 * job").
 * =================================================================
 */

use crate::state::stream_multiplexer::FinalizeOutcome;
use crate::state::AppState;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

const SWEEP_INTERVAL_SECONDS: u64 = 5;

pub fn spawn_registry_sweep(state: AppState) {
    let mut ticker = interval(Duration::from_secs(SWEEP_INTERVAL_SECONDS));

    tokio::spawn(async move {
        info!("💀 [REGISTRY_SWEEP]: Stale-worker hygiene daemon initiated.");

        loop {
            ticker.tick().await;

            let swept = state.registry.sweep_stale();
            if swept.is_empty() {
                continue;
            }

            for stale_worker in swept {
                warn!("💀 [REGISTRY_SWEEP]: Worker [{}] went stale with {} job(s) in flight", stale_worker.worker_id, stale_worker.active_jobs.len());
                for job_id in stale_worker.active_jobs {
                    state
                        .streams
                        .finalize(&job_id, FinalizeOutcome::Failed { error: "worker_disconnected".to_string() })
                        .await;
                }
            }
        }
    });
}
