//! Message bus abstraction.
//!
//! The cluster core consumes the host transport through this narrow
//! interface: unicast, broadcast, and a polling receive with timeout, plus
//! an optional privileged direct-attachment capability used only by the
//! deployment fast path. The transport is assumed unreliable; nothing here
//! guarantees delivery.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use hivemind_proto::{Envelope, NodeId};

#[derive(Debug, Error)]
pub enum BusError {
    /// Receive window elapsed with no frame on the requested protocol
    #[error("receive window elapsed")]
    Timeout,

    /// Transport torn down; no further traffic possible
    #[error("bus closed")]
    Closed,

    /// This transport has no direct-attachment capability for the node
    #[error("operation not supported by this transport")]
    Unsupported,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Narrow transport interface consumed by the cluster core.
///
/// Implementations must tag frames with a protocol string and must skip,
/// silently, inbound frames on other tags or that fail to decode; the core
/// treats those as noise, not as errors.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// This endpoint's stable transport-level id
    fn node_id(&self) -> NodeId;

    /// Send to one node. Best-effort: success means handed to the transport.
    async fn unicast(&self, to: NodeId, protocol: &str, envelope: Envelope)
        -> Result<(), BusError>;

    /// Send to every reachable node except this one.
    async fn broadcast(&self, protocol: &str, envelope: Envelope) -> Result<(), BusError>;

    /// Wait up to `timeout` for the next frame on `protocol`.
    /// `Err(BusError::Timeout)` is the normal window-expiry outcome.
    async fn recv(&self, protocol: &str, timeout: Duration) -> Result<(NodeId, Envelope), BusError>;

    /// Nodes reachable through a privileged local attachment (deploy fast path).
    fn attached_nodes(&self) -> Vec<NodeId> {
        Vec::new()
    }

    /// Write a file onto an attached node's storage.
    async fn push_file(&self, _to: NodeId, _path: &str, _bytes: &[u8]) -> Result<(), BusError> {
        Err(BusError::Unsupported)
    }

    /// Trigger execution on an attached node.
    async fn execute(&self, _to: NodeId, _command: &str) -> Result<(), BusError> {
        Err(BusError::Unsupported)
    }
}
