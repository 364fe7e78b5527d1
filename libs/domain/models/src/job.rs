// [libs/domain/models/src/job.rs]
//! Job lifecycle types (spec §3 "Job", §4.C "Job Store").

use serde::{Deserialize, Serialize};

/// A single chat-completion message. The transcript the user submits is
/// passed through verbatim (spec: "opaque structured payload") but is
/// still typed here so the receipt chain can canonicalize it deterministically
/// for hashing (spec §4.F step 2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Job lifecycle status. Forms a DAG rooted at `Pending`; `Completed` and
/// `Failed` are terminal (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Assigned,
    Streaming,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Assigned => "assigned",
            JobStatus::Streaming => "streaming",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "assigned" => Some(JobStatus::Assigned),
            "streaming" => Some(JobStatus::Streaming),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// The durable record tracked by the Job Store (spec §3 "Job", §4.C).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub status: JobStatus,
    pub assigned_worker: Option<String>,
    pub response: Option<String>,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Canonical JSON bytes of a message transcript, used as the input to
/// `request_hash` (spec §4.F step 2). Deterministic because `ChatMessage`
/// carries no optional/unordered fields.
pub fn canonical_message_bytes(messages: &[ChatMessage]) -> Vec<u8> {
    serde_json::to_vec(messages).expect("ChatMessage serialization is infallible")
}

/// Body returned by `GET /inference/poll` on a successful claim.
#[derive(Debug, Clone, Serialize)]
pub struct PolledJob {
    pub id: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// Body of `POST /inference/complete` (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteRequest {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
