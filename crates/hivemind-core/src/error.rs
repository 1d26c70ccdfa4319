//! Cluster error taxonomy.
//!
//! Per-node and per-role failures during startup are recorded in outcomes,
//! not raised; these errors cover terminal startup conditions and the
//! per-call failure modes of the task dispatcher.

use hivemind_proto::{CorrelationId, RoleName};
use thiserror::Error;

use crate::bus::BusError;

#[derive(Debug, Error)]
pub enum ClusterError {
    /// Discovery window closed with zero replies; startup does not proceed
    #[error("no workers found during discovery")]
    NoWorkersFound,

    /// Call attempted against a role with no ready node; nothing was sent
    #[error("no ready worker for role '{0}'")]
    WorkerNotReady(RoleName),

    /// No matching result arrived before the call deadline
    #[error("task {correlation} for role '{role}' timed out")]
    TaskTimeout {
        role: RoleName,
        correlation: CorrelationId,
    },

    /// The worker answered, but with an error reply
    #[error("worker for role '{role}' returned an error: {reason}")]
    WorkerError { role: RoleName, reason: String },

    /// Cluster shut down while the call was in flight
    #[error("call canceled by cluster shutdown")]
    Canceled,

    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}
