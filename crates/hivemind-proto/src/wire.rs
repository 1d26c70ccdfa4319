//! Wire codec for cluster frames.
//!
//! MessagePack on the bus, JSON helpers for logs and debugging. The wire
//! format is internal to the cluster: both ends are deployed from the same
//! tree, so no cross-version compatibility is attempted.

use rmp_serde::{decode, encode};
use thiserror::Error;

use crate::Envelope;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode error: {0}")]
    Encode(#[from] encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] decode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn serialize_envelope(envelope: &Envelope) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec_named(envelope)?)
}

pub fn deserialize_envelope(bytes: &[u8]) -> Result<Envelope, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_envelope_json(envelope: &Envelope) -> Result<String, WireError> {
    Ok(serde_json::to_string(envelope)?)
}

pub fn deserialize_envelope_json(json: &str) -> Result<Envelope, WireError> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CorrelationId, RoleName, TaskReply};
    use serde_json::json;

    #[test]
    fn task_frame_roundtrip() {
        let env = Envelope::Task {
            correlation: CorrelationId(42),
            operation: "ping".into(),
            payload: json!({"who": "brain"}),
        };
        let bytes = serialize_envelope(&env).unwrap();
        match deserialize_envelope(&bytes).unwrap() {
            Envelope::Task {
                correlation,
                operation,
                payload,
            } => {
                assert_eq!(correlation, CorrelationId(42));
                assert_eq!(operation, "ping");
                assert_eq!(payload["who"], "brain");
            }
            other => panic!("wrong envelope: {other:?}"),
        }
    }

    #[test]
    fn result_frame_roundtrip() {
        let env = Envelope::TaskResult {
            correlation: CorrelationId(42),
            reply: TaskReply::Error("no such operation".into()),
        };
        let bytes = serialize_envelope(&env).unwrap();
        match deserialize_envelope(&bytes).unwrap() {
            Envelope::TaskResult { correlation, reply } => {
                assert_eq!(correlation, CorrelationId(42));
                assert_eq!(reply, TaskReply::Error("no such operation".into()));
            }
            other => panic!("wrong envelope: {other:?}"),
        }
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(deserialize_envelope(&[0xc1, 0xff, 0x00]).is_err());
    }

    #[test]
    fn json_form_is_tagged() {
        let env = Envelope::RoleAck {
            role: RoleName::new("memory"),
            ok: true,
        };
        let json = serialize_envelope_json(&env).unwrap();
        assert!(json.contains("\"type\":\"RoleAck\""));
        let back = deserialize_envelope_json(&json).unwrap();
        assert!(matches!(back, Envelope::RoleAck { ok: true, .. }));
    }
}
