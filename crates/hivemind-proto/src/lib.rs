//! Hivemind protocol - message envelopes and wire codec.
//!
//! Shared between the coordinator and worker nodes. Everything here is
//! plain data: no async, no I/O, no cluster logic.

pub mod envelope;
pub mod ids;
pub mod role;
pub mod wire;

pub use envelope::{Envelope, TaskReply};
pub use ids::{CorrelationId, NodeId, RoleName};
pub use role::{FileRef, RoleDefinition};
pub use wire::WireError;

/// Protocol tag for all cluster traffic (must match deployed workers).
pub const PROTOCOL: &str = "hivemind/1";
