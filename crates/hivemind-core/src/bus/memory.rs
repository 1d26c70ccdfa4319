//! In-process message bus for development and tests.
//!
//! A hub with one mailbox per node. Every frame goes through the real wire
//! codec so the serialization path is exercised even without a network, and
//! an optional drop probability simulates the lossy transport the cluster
//! is designed for. A configurable attachment set backs the deploy fast
//! path (`push_file` / `execute`), with pushed files recorded in the hub so
//! tests can inspect them.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use hivemind_proto::{wire, Envelope, NodeId};

use super::{BusError, MessageBus};

struct Frame {
    from: NodeId,
    protocol: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct HubInner {
    mailboxes: HashMap<NodeId, mpsc::UnboundedSender<Frame>>,
    attached: HashSet<NodeId>,
    files: HashMap<(NodeId, String), Vec<u8>>,
    executed: Vec<(NodeId, String)>,
    loss: f64,
}

/// Shared switchboard connecting `MemoryBus` endpoints.
#[derive(Default)]
pub struct MemoryHub {
    inner: Mutex<HubInner>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create an endpoint for a node, registering its mailbox.
    pub fn endpoint(self: &Arc<Self>, id: NodeId) -> MemoryBus {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().mailboxes.insert(id, tx);
        MemoryBus {
            hub: Arc::clone(self),
            id,
            inbox: tokio::sync::Mutex::new(rx),
        }
    }

    /// Mark a node reachable through the privileged attachment capability.
    pub fn attach(&self, id: NodeId) {
        self.lock().attached.insert(id);
    }

    /// Probability in [0, 1] that any delivered frame is silently dropped.
    pub fn set_loss(&self, loss: f64) {
        self.lock().loss = loss.clamp(0.0, 1.0);
    }

    /// File contents pushed to a node via the fast path, if any.
    pub fn pushed_file(&self, id: NodeId, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(&(id, path.to_string())).cloned()
    }

    /// Commands triggered on attached nodes, in order.
    pub fn executed(&self) -> Vec<(NodeId, String)> {
        self.lock().executed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().expect("memory hub lock poisoned")
    }

    fn deliver(&self, to: NodeId, frame: Frame) {
        let inner = self.lock();
        if inner.loss > 0.0 && rand::thread_rng().gen::<f64>() < inner.loss {
            trace!(%to, "frame dropped by loss simulation");
            return;
        }
        // Unknown or gone target: the frame is lost, as on a real lossy bus.
        if let Some(tx) = inner.mailboxes.get(&to) {
            let _ = tx.send(frame);
        }
    }
}

/// One node's endpoint on a `MemoryHub`.
pub struct MemoryBus {
    hub: Arc<MemoryHub>,
    id: NodeId,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
}

impl MemoryBus {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, BusError> {
        wire::serialize_envelope(envelope).map_err(|e| BusError::Transport(e.to_string()))
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    fn node_id(&self) -> NodeId {
        self.id
    }

    async fn unicast(
        &self,
        to: NodeId,
        protocol: &str,
        envelope: Envelope,
    ) -> Result<(), BusError> {
        let bytes = self.encode(&envelope)?;
        self.hub.deliver(
            to,
            Frame {
                from: self.id,
                protocol: protocol.to_string(),
                bytes,
            },
        );
        Ok(())
    }

    async fn broadcast(&self, protocol: &str, envelope: Envelope) -> Result<(), BusError> {
        let bytes = self.encode(&envelope)?;
        let targets: Vec<NodeId> = {
            let inner = self.hub.lock();
            inner.mailboxes.keys().copied().filter(|&n| n != self.id).collect()
        };
        for to in targets {
            self.hub.deliver(
                to,
                Frame {
                    from: self.id,
                    protocol: protocol.to_string(),
                    bytes: bytes.clone(),
                },
            );
        }
        Ok(())
    }

    async fn recv(&self, protocol: &str, timeout: Duration) -> Result<(NodeId, Envelope), BusError> {
        let deadline = Instant::now() + timeout;
        let mut inbox = self.inbox.lock().await;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BusError::Timeout);
            }
            match tokio::time::timeout(remaining, inbox.recv()).await {
                Err(_) => return Err(BusError::Timeout),
                Ok(None) => return Err(BusError::Closed),
                Ok(Some(frame)) => {
                    if frame.protocol != protocol {
                        trace!(from = %frame.from, protocol = %frame.protocol, "foreign protocol frame skipped");
                        continue;
                    }
                    match wire::deserialize_envelope(&frame.bytes) {
                        Ok(envelope) => return Ok((frame.from, envelope)),
                        Err(e) => {
                            debug!(from = %frame.from, error = %e, "undecodable frame skipped");
                            continue;
                        }
                    }
                }
            }
        }
    }

    fn attached_nodes(&self) -> Vec<NodeId> {
        let inner = self.hub.lock();
        let mut nodes: Vec<NodeId> = inner.attached.iter().copied().collect();
        nodes.sort();
        nodes
    }

    async fn push_file(&self, to: NodeId, path: &str, bytes: &[u8]) -> Result<(), BusError> {
        let mut inner = self.hub.lock();
        if !inner.attached.contains(&to) {
            return Err(BusError::Unsupported);
        }
        inner.files.insert((to, path.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn execute(&self, to: NodeId, command: &str) -> Result<(), BusError> {
        let mut inner = self.hub.lock();
        if !inner.attached.contains(&to) {
            return Err(BusError::Unsupported);
        }
        inner.executed.push((to, command.to_string()));
        Ok(())
    }
}
