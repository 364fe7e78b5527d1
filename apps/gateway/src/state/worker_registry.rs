// [apps/gateway/src/state/worker_registry.rs]
/*!
 * =================================================================
 * APARATO: WORKER REGISTRY (V1.0)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L3)
 * RESPONSABILIDAD: IDENTIDAD, LIVENESS Y CANAL PUSH DE LOS WORKERS
 *
 * Authoritative view of which workers are online, what models they
 * serve, and which hold an open push channel (spec §4.B). A single
 * `RwLock<HashMap<...>>` is adequate: reads (filtering, dispatch
 * lookups) vastly outnumber writes (heartbeat, push assignment).
 * =================================================================
 */

use chrono::{DateTime, Utc};
use relay_domain::stream::ServerFrame;
use relay_domain::worker::{WorkerFilter, WorkerSnapshot, WorkerStatus};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Heartbeat staleness threshold (spec §4.B: "older than 120s").
const STALE_AFTER_SECONDS: i64 = 120;

pub type PushSender = mpsc::Sender<ServerFrame>;

struct WorkerEntry {
    worker_id: String,
    models: BTreeSet<String>,
    region: Option<String>,
    runtime: Option<String>,
    status: WorkerStatus,
    last_heartbeat: DateTime<Utc>,
    push_channel: Option<PushSender>,
    active_jobs: HashSet<String>,
}

impl WorkerEntry {
    fn to_snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            worker_id: self.worker_id.clone(),
            models: self.models.clone(),
            region: self.region.clone(),
            runtime: self.runtime.clone(),
            status: self.status,
            last_heartbeat: self.last_heartbeat,
            active_job_count: self.active_jobs.len(),
            has_push_channel: self.push_channel.is_some(),
        }
    }

    fn serves(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m == model)
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        (now - self.last_heartbeat).num_seconds() > STALE_AFTER_SECONDS
    }
}

/// A worker that was swept as stale while carrying in-flight jobs; the
/// caller (the sweep daemon) is responsible for failing those jobs.
pub struct StaleWorker {
    pub worker_id: String,
    pub active_jobs: Vec<String>,
}

#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerEntry>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self { workers: RwLock::new(HashMap::new()) }
    }

    /// Registers a worker, or rotates it in place if it already exists.
    pub fn register(&self, worker_id: &str, models: BTreeSet<String>, region: Option<String>, runtime: Option<String>) {
        let mut guard = self.workers.write().expect("worker registry lock poisoned");
        let entry = guard.entry(worker_id.to_string()).or_insert_with(|| WorkerEntry {
            worker_id: worker_id.to_string(),
            models: BTreeSet::new(),
            region: None,
            runtime: None,
            status: WorkerStatus::Unseen,
            last_heartbeat: Utc::now(),
            push_channel: None,
            active_jobs: HashSet::new(),
        });
        entry.models = models;
        entry.region = region;
        entry.runtime = runtime;
        entry.status = WorkerStatus::Idle;
        entry.last_heartbeat = Utc::now();
        info!("📡 [REGISTRY]: Worker [{}] registered, serving {:?}", worker_id, entry.models);
    }

    /// Records a heartbeat: updates last-seen instant and declared models.
    /// Returns the resulting status, or `None` if the worker was never
    /// registered (the caller may choose to treat this as an implicit
    /// registration; the gateway's heartbeat handler does so).
    pub fn heartbeat(&self, worker_id: &str, models: Option<BTreeSet<String>>) -> Option<WorkerStatus> {
        let mut guard = self.workers.write().expect("worker registry lock poisoned");
        let entry = guard.get_mut(worker_id)?;
        entry.last_heartbeat = Utc::now();
        if let Some(models) = models {
            entry.models = models;
        }
        if entry.status == WorkerStatus::Stale || entry.status == WorkerStatus::Unseen {
            entry.status = if entry.active_jobs.is_empty() { WorkerStatus::Idle } else { WorkerStatus::Busy };
        }
        debug!("💓 [REGISTRY]: Heartbeat from [{}], status {:?}", worker_id, entry.status);
        Some(entry.status)
    }

    /// Attaches (or replaces) a worker's live push channel, used once the
    /// bidirectional socket handshake completes.
    pub fn attach_push_channel(&self, worker_id: &str, sender: PushSender) {
        let mut guard = self.workers.write().expect("worker registry lock poisoned");
        if let Some(entry) = guard.get_mut(worker_id) {
            entry.push_channel = Some(sender);
            debug!("🔌 [REGISTRY]: Push channel attached for [{}]", worker_id);
        }
    }

    /// Detaches a worker's push channel (socket closed). Does not itself
    /// mark the worker stale — that is the sweep daemon's job, driven by
    /// heartbeat age, per spec §4.B.
    pub fn detach_push_channel(&self, worker_id: &str) {
        let mut guard = self.workers.write().expect("worker registry lock poisoned");
        if let Some(entry) = guard.get_mut(worker_id) {
            entry.push_channel = None;
        }
    }

    /// Whether any non-stale worker currently declares `model`
    /// (spec §4.D step 1 — existence check, independent of push/idle).
    pub fn has_live_worker_for_model(&self, model: &str) -> bool {
        let guard = self.workers.read().expect("worker registry lock poisoned");
        guard.values().any(|w| w.status != WorkerStatus::Stale && w.serves(model))
    }

    /// Atomically selects the first push-connected, idle worker eligible
    /// for `model` and marks it busy with `job_id` in its active set
    /// (spec §4.D step 4). Returns the worker id and a clone of its
    /// push sender so the caller can deliver the job envelope.
    pub fn try_assign_push(&self, model: &str, job_id: &str) -> Option<(String, PushSender)> {
        let mut guard = self.workers.write().expect("worker registry lock poisoned");
        let candidate_id = guard
            .values()
            .find(|w| w.status == WorkerStatus::Idle && w.push_channel.is_some() && w.serves(model))
            .map(|w| w.worker_id.clone())?;

        let entry = guard.get_mut(&candidate_id)?;
        let sender = entry.push_channel.clone()?;
        entry.status = WorkerStatus::Busy;
        entry.active_jobs.insert(job_id.to_string());
        Some((candidate_id, sender))
    }

    /// Records a pull-path claim (spec §4.C `claim_next`) against a
    /// worker's active set, mirroring the bookkeeping `try_assign_push`
    /// does for the push path.
    pub fn mark_claimed(&self, worker_id: &str, job_id: &str) {
        let mut guard = self.workers.write().expect("worker registry lock poisoned");
        if let Some(entry) = guard.get_mut(worker_id) {
            entry.status = WorkerStatus::Busy;
            entry.active_jobs.insert(job_id.to_string());
        }
    }

    /// Removes a job from a worker's active set, returning it to idle if
    /// that was its last job.
    pub fn release_job(&self, worker_id: &str, job_id: &str) {
        let mut guard = self.workers.write().expect("worker registry lock poisoned");
        if let Some(entry) = guard.get_mut(worker_id) {
            entry.active_jobs.remove(job_id);
            if entry.active_jobs.is_empty() && entry.status == WorkerStatus::Busy {
                entry.status = WorkerStatus::Idle;
            }
        }
    }

    /// The models a registered worker declared, for use with
    /// `JobRepository::claim_next` (spec §4.C). Empty if the worker is
    /// unknown.
    pub fn models_for(&self, worker_id: &str) -> Vec<String> {
        let guard = self.workers.read().expect("worker registry lock poisoned");
        guard.get(worker_id).map(|w| w.models.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn filter(&self, filter: &WorkerFilter) -> Vec<WorkerSnapshot> {
        let guard = self.workers.read().expect("worker registry lock poisoned");
        guard
            .values()
            .filter(|w| filter.status.map(|s| s == w.status).unwrap_or(true))
            .filter(|w| filter.region.as_deref().map(|r| w.region.as_deref() == Some(r)).unwrap_or(true))
            .filter(|w| filter.runtime.as_deref().map(|r| w.runtime.as_deref() == Some(r)).unwrap_or(true))
            .filter(|w| filter.model.as_deref().map(|m| w.serves(m)).unwrap_or(true))
            .map(WorkerEntry::to_snapshot)
            .collect()
    }

    /// Sweeps the registry for workers whose heartbeat has gone stale
    /// without a live push channel (spec §4.B). Returns the set of
    /// newly-stale workers along with the jobs they were carrying, so
    /// the caller can fail those jobs with `worker_disconnected`.
    pub fn sweep_stale(&self) -> Vec<StaleWorker> {
        let now = Utc::now();
        let mut guard = self.workers.write().expect("worker registry lock poisoned");
        let mut swept = Vec::new();

        for entry in guard.values_mut() {
            if entry.status == WorkerStatus::Stale {
                continue;
            }
            if entry.push_channel.is_none() && entry.is_stale(now) {
                warn!("💀 [REGISTRY_SWEEP]: Worker [{}] stale, in-flight jobs {:?}", entry.worker_id, entry.active_jobs);
                entry.status = WorkerStatus::Stale;
                let jobs: Vec<String> = entry.active_jobs.drain().collect();
                swept.push(StaleWorker { worker_id: entry.worker_id.clone(), active_jobs: jobs });
            }
        }

        swept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_heartbeat_reports_idle() {
        let registry = WorkerRegistry::new();
        registry.register("w1", BTreeSet::from(["llama3.2".to_string()]), None, None);
        assert_eq!(registry.heartbeat("w1", None), Some(WorkerStatus::Idle));
    }

    #[test]
    fn try_assign_push_requires_idle_and_channel() {
        let registry = WorkerRegistry::new();
        registry.register("w1", BTreeSet::from(["llama3.2".to_string()]), None, None);
        assert!(registry.try_assign_push("llama3.2", "job-1").is_none(), "no push channel yet");

        let (sender, _receiver) = mpsc::channel(8);
        registry.attach_push_channel("w1", sender);

        let assigned = registry.try_assign_push("llama3.2", "job-1");
        assert!(assigned.is_some());
        assert!(registry.try_assign_push("llama3.2", "job-2").is_none(), "worker is now busy");
    }

    #[test]
    fn sweep_stale_requires_no_push_channel_and_expired_heartbeat() {
        let registry = WorkerRegistry::new();
        registry.register("w1", BTreeSet::from(["llama3.2".to_string()]), None, None);
        {
            let mut guard = registry.workers.write().unwrap();
            let entry = guard.get_mut("w1").unwrap();
            entry.last_heartbeat = Utc::now() - chrono::Duration::seconds(200);
            entry.active_jobs.insert("job-x".into());
        }
        let swept = registry.sweep_stale();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].worker_id, "w1");
        assert_eq!(swept[0].active_jobs, vec!["job-x".to_string()]);
    }

    #[test]
    fn has_live_worker_for_model_ignores_stale() {
        let registry = WorkerRegistry::new();
        registry.register("w1", BTreeSet::from(["llama3.2".to_string()]), None, None);
        assert!(registry.has_live_worker_for_model("llama3.2"));
        {
            let mut guard = registry.workers.write().unwrap();
            guard.get_mut("w1").unwrap().status = WorkerStatus::Stale;
        }
        assert!(!registry.has_live_worker_for_model("llama3.2"));
    }
}
