// [libs/domain/models/src/stream.rs]
//! Wire types for the stream multiplexer (spec §4.E). Pure data only —
//! the multiplexer's actor state lives in `apps/gateway`; this module is
//! shared by both producer paths (push socket frames, pull HTTP frames)
//! and by every subscriber shape so the two paths can be forced through
//! one `apply_delta` contract (spec §9 "Two producer paths, one contract").

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Response,
    Reasoning,
}

impl Default for ContentType {
    fn default() -> Self {
        ContentType::Response
    }
}

/// A single producer frame, normalized from either the push path (`token`)
/// or the pull path (`/inference/stream` body). Carrying both paths'
/// optional fields in one struct is what lets `apply_delta` stay a single
/// function (spec §4.E "Unified apply rule").
#[derive(Debug, Clone, Deserialize)]
pub struct ProducerFrame {
    pub job_id: String,
    #[serde(default)]
    pub seq: Option<u64>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub delta: Option<String>,
    #[serde(default)]
    pub cumulative: Option<String>,
    /// Legacy field name accepted for back-compat producers (spec §4.E step 3).
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub done: bool,
}

/// A frame fanned out to subscribers (spec §4.E step 7).
#[derive(Debug, Clone, Serialize)]
pub struct DeltaFrame {
    pub job_id: String,
    pub offset: usize,
    pub delta: String,
    pub content_type: ContentType,
    pub done: bool,
}

/// Outcome of applying a producer frame, returned to the producer
/// (spec §6: `{ok: true, offset}` / `{error: "offset_mismatch", expected}`).
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    Ok { offset: usize },
    OffsetMismatch { expected: usize },
}

impl Serialize for ApplyOutcome {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            ApplyOutcome::Ok { offset } => {
                map.serialize_entry("ok", &true)?;
                map.serialize_entry("offset", offset)?;
            }
            ApplyOutcome::OffsetMismatch { expected } => {
                map.serialize_entry("error", "offset_mismatch")?;
                map.serialize_entry("expected", expected)?;
            }
        }
        map.end()
    }
}

/// A typed frame of the bidirectional worker channel (spec §6, `type`
/// discriminator). `ServerFrame` flows server -> worker; `WorkerFrame`
/// flows worker -> server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Registered { worker_id: String },
    Job {
        job_id: String,
        model: String,
        messages: Vec<crate::job::ChatMessage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        options: Option<serde_json::Value>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerFrame {
    Heartbeat { models: std::collections::BTreeSet<String> },
    Token {
        job_id: String,
        #[serde(default)]
        reasoning: Option<String>,
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        done: bool,
    },
    JobComplete { job_id: String, response: String },
    JobError { job_id: String, error: String },
    Status { detail: String },
}

/// An event delivered to the server-sent-event subscriber shape (spec §6
/// `/chat/stream`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SubscriberEvent {
    Started { job_id: String },
    Delta { content_type: ContentType, delta: String },
    Done { node_id: Option<String> },
    Error { error: String },
}

/// A frame delivered to the legacy long-lived duplex subscriber channel
/// (spec §6, §4.E "Attach-time catch-up"). Distinct from `SubscriberEvent`
/// because the duplex channel additionally carries the backlog frame's
/// offset, which the SSE shape does not need to expose.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DuplexFrame {
    Backlog { job_id: String, offset: usize, delta: String },
    Delta(DeltaFrame),
    Timeout { job_id: String },
}
