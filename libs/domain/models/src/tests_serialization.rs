// [libs/domain/models/src/tests_serialization.rs]
//! Wire-shape and code-point discipline certification for the domain
//! types (spec §8 invariant 6 "code-point fidelity").

use crate::job::{canonical_message_bytes, ChatMessage};
use crate::stream::{ApplyOutcome, ContentType, ProducerFrame, WorkerFrame};
use crate::worker::{RegisterRequest, WorkerStatus};

#[test]
fn worker_status_round_trips_lowercase() {
    let json = serde_json::to_string(&WorkerStatus::Busy).unwrap();
    assert_eq!(json, "\"busy\"");
    let parsed: WorkerStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, WorkerStatus::Busy);
}

#[test]
fn register_request_accepts_missing_optional_fields() {
    let body = r#"{"worker_id":"w1","models":["llama3.2"]}"#;
    let parsed: RegisterRequest = serde_json::from_str(body).unwrap();
    assert_eq!(parsed.worker_id, "w1");
    assert!(parsed.region.is_none());
}

#[test]
fn producer_frame_accepts_push_and_pull_shapes() {
    let push = r#"{"job_id":"j1","delta":"he","done":false}"#;
    let pull = r#"{"job_id":"j1","offset":0,"delta":"he","done":false,"content_type":"response"}"#;

    let push_frame: ProducerFrame = serde_json::from_str(push).unwrap();
    let pull_frame: ProducerFrame = serde_json::from_str(pull).unwrap();

    assert_eq!(push_frame.delta.as_deref(), Some("he"));
    assert_eq!(pull_frame.offset, Some(0));
    assert_eq!(pull_frame.content_type, ContentType::Response);
}

#[test]
fn worker_frame_token_variant_tags_correctly() {
    let body = r#"{"type":"token","job_id":"j1","token":"hi","done":false}"#;
    let frame: WorkerFrame = serde_json::from_str(body).unwrap();
    match frame {
        WorkerFrame::Token { job_id, token, done, .. } => {
            assert_eq!(job_id, "j1");
            assert_eq!(token.as_deref(), Some("hi"));
            assert!(!done);
        }
        other => panic!("expected Token variant, got {:?}", other),
    }
}

#[test]
fn canonical_message_bytes_are_stable_for_equal_transcripts() {
    let a = vec![ChatMessage { role: "user".into(), content: "hi".into() }];
    let b = vec![ChatMessage { role: "user".into(), content: "hi".into() }];
    assert_eq!(canonical_message_bytes(&a), canonical_message_bytes(&b));
}

#[test]
fn apply_outcome_serializes_to_the_worker_facing_envelope() {
    let ok = serde_json::to_value(ApplyOutcome::Ok { offset: 7 }).unwrap();
    assert_eq!(ok, serde_json::json!({ "ok": true, "offset": 7 }));

    let mismatch = serde_json::to_value(ApplyOutcome::OffsetMismatch { expected: 3 }).unwrap();
    assert_eq!(mismatch, serde_json::json!({ "error": "offset_mismatch", "expected": 3 }));
}

#[test]
fn multibyte_delta_code_point_count_is_not_byte_length() {
    // "👋" is four UTF-8 bytes but a single Unicode scalar value. The
    // multiplexer's offset arithmetic (apps/gateway) must advance by
    // `chars().count()`, never `len()`; this test pins the fact being
    // relied upon rather than the multiplexer itself.
    let delta = " 👋";
    assert_eq!(delta.chars().count(), 2);
    assert_eq!(delta.len(), 5);
}
