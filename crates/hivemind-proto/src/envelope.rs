//! Cluster protocol messages.
//!
//! One tagged enum for both directions: the coordinator sends `Discover`,
//! `Deploy`, `AssignRole`, `Task` and `Shutdown`; workers answer with
//! `WorkerAvailable`, `RoleAck`, `InstallComplete`/`InstallError` and
//! `TaskResult`. Task and result payloads are opaque JSON values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CorrelationId, FileRef, NodeId, RoleName};

/// Every message exchanged on the cluster protocol tag.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// Coordinator announces itself and asks workers to report in
    Discover { coordinator: NodeId },
    /// Worker reply to `Discover`
    WorkerAvailable,

    /// Bootstrap payload, sent when the direct-push fast path is unavailable.
    /// Only works if the remote side is already listening.
    Deploy { payload: Vec<u8>, execute: bool },

    /// Offer a role to a worker
    AssignRole {
        role: RoleName,
        #[serde(default)]
        manifest: Vec<FileRef>,
    },
    /// Worker accepts or refuses a role
    RoleAck { role: RoleName, ok: bool },
    /// Worker finished installing the role payload (positive ack)
    InstallComplete { role: RoleName },
    /// Role payload installation failed (negative ack)
    InstallError { role: RoleName, reason: String },

    /// Correlated request to a role-bound worker
    Task {
        correlation: CorrelationId,
        operation: String,
        payload: Value,
    },
    /// Worker reply to exactly one `Task`
    TaskResult {
        correlation: CorrelationId,
        reply: TaskReply,
    },

    /// Best-effort stop signal, never acknowledged
    Shutdown,
}

/// Outcome a worker reports for a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value")]
pub enum TaskReply {
    Ok(Value),
    Error(String),
}
