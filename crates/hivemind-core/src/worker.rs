//! Worker runtime - the node-side half of the protocol.
//!
//! This is what the deployed bootstrap runs: answer discovery, accept a
//! role, serve tasks through the role's handler, stop on shutdown. One
//! worker serves at most one role per session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use hivemind_proto::{Envelope, NodeId, RoleName, TaskReply, PROTOCOL};

use crate::bus::{BusError, MessageBus};

/// Implements one role's operations on a worker node.
#[async_trait]
pub trait RoleHandler: Send + Sync {
    /// Execute one operation. An `Err` is reported to the coordinator as a
    /// task error reply, not a transport failure.
    async fn handle(&self, operation: &str, payload: Value) -> Result<Value, String>;
}

/// A worker node's protocol loop.
pub struct Worker {
    bus: Arc<dyn MessageBus>,
    handlers: HashMap<RoleName, Arc<dyn RoleHandler>>,
    role: Option<RoleName>,
    poll: Duration,
}

impl Worker {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            bus,
            handlers: HashMap::new(),
            role: None,
            poll: Duration::from_millis(250),
        }
    }

    /// Register the handler for a role this worker is able to serve.
    pub fn with_handler(mut self, role: impl Into<String>, handler: Arc<dyn RoleHandler>) -> Self {
        self.handlers.insert(RoleName::new(role), handler);
        self
    }

    /// Override the receive poll granularity (tests use short polls).
    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Serve the protocol until a shutdown frame arrives or the bus closes.
    pub async fn run(mut self) -> Result<(), BusError> {
        let id = self.bus.node_id();
        info!(%id, "worker listening");

        loop {
            let (from, envelope) = match self.bus.recv(PROTOCOL, self.poll).await {
                Ok(frame) => frame,
                Err(BusError::Timeout) => continue,
                Err(BusError::Closed) => {
                    debug!(%id, "bus closed, worker exiting");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            match envelope {
                Envelope::Discover { coordinator } => {
                    debug!(%id, %coordinator, "discovery request");
                    self.bus
                        .unicast(coordinator, PROTOCOL, Envelope::WorkerAvailable)
                        .await?;
                }
                Envelope::AssignRole { role, manifest } => {
                    let ok = self.handlers.contains_key(&role);
                    if ok {
                        info!(%id, %role, files = manifest.len(), "role accepted");
                        self.role = Some(role.clone());
                    } else {
                        warn!(%id, %role, "role refused, no handler registered");
                    }
                    self.bus
                        .unicast(from, PROTOCOL, Envelope::RoleAck { role, ok })
                        .await?;
                }
                Envelope::Task {
                    correlation,
                    operation,
                    payload,
                } => {
                    let reply = match self.role.as_ref().and_then(|r| self.handlers.get(r)) {
                        Some(handler) => match handler.handle(&operation, payload).await {
                            Ok(value) => TaskReply::Ok(value),
                            Err(reason) => TaskReply::Error(reason),
                        },
                        None => TaskReply::Error("no role assigned".to_string()),
                    };
                    self.bus
                        .unicast(from, PROTOCOL, Envelope::TaskResult { correlation, reply })
                        .await?;
                }
                Envelope::Shutdown => {
                    info!(%id, "shutdown received");
                    return Ok(());
                }
                Envelope::Deploy { .. } => {
                    // Already running; a late bootstrap frame is harmless.
                    debug!(%id, "deploy frame ignored, worker already up");
                }
                other => {
                    debug!(%id, "unexpected frame ignored: {other:?}");
                }
            }
        }
    }
}

/// Handler that echoes the payload back, for development and simulation.
pub struct EchoHandler;

#[async_trait]
impl RoleHandler for EchoHandler {
    async fn handle(&self, operation: &str, payload: Value) -> Result<Value, String> {
        match operation {
            "ping" => Ok(Value::String("pong".to_string())),
            _ => Ok(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryHub;
    use hivemind_proto::CorrelationId;
    use serde_json::json;

    fn short_poll_worker(hub: &Arc<MemoryHub>, id: u64, role: &str) -> Worker {
        Worker::new(Arc::new(hub.endpoint(NodeId(id))))
            .with_handler(role, Arc::new(EchoHandler))
            .with_poll(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn answers_discovery_and_serves_after_assignment() {
        let hub = MemoryHub::new();
        let coordinator = hub.endpoint(NodeId(0));
        let worker = short_poll_worker(&hub, 1, "memory");
        let handle = tokio::spawn(worker.run());

        coordinator
            .broadcast(PROTOCOL, Envelope::Discover { coordinator: NodeId(0) })
            .await
            .unwrap();
        let (from, env) = coordinator
            .recv(PROTOCOL, Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(from, NodeId(1));
        assert!(matches!(env, Envelope::WorkerAvailable));

        coordinator
            .unicast(
                NodeId(1),
                PROTOCOL,
                Envelope::AssignRole {
                    role: RoleName::new("memory"),
                    manifest: Vec::new(),
                },
            )
            .await
            .unwrap();
        let (_, env) = coordinator
            .recv(PROTOCOL, Duration::from_millis(500))
            .await
            .unwrap();
        assert!(matches!(env, Envelope::RoleAck { ok: true, .. }));

        coordinator
            .unicast(
                NodeId(1),
                PROTOCOL,
                Envelope::Task {
                    correlation: CorrelationId(9),
                    operation: "ping".to_string(),
                    payload: json!({}),
                },
            )
            .await
            .unwrap();
        let (_, env) = coordinator
            .recv(PROTOCOL, Duration::from_millis(500))
            .await
            .unwrap();
        match env {
            Envelope::TaskResult { correlation, reply } => {
                assert_eq!(correlation, CorrelationId(9));
                assert_eq!(reply, TaskReply::Ok(json!("pong")));
            }
            other => panic!("wrong envelope: {other:?}"),
        }

        coordinator
            .unicast(NodeId(1), PROTOCOL, Envelope::Shutdown)
            .await
            .unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn refuses_unknown_role_and_unassigned_tasks() {
        let hub = MemoryHub::new();
        let coordinator = hub.endpoint(NodeId(0));
        let worker = short_poll_worker(&hub, 1, "memory");
        let handle = tokio::spawn(worker.run());

        coordinator
            .unicast(
                NodeId(1),
                PROTOCOL,
                Envelope::AssignRole {
                    role: RoleName::new("generation"),
                    manifest: Vec::new(),
                },
            )
            .await
            .unwrap();
        let (_, env) = coordinator
            .recv(PROTOCOL, Duration::from_millis(500))
            .await
            .unwrap();
        assert!(matches!(env, Envelope::RoleAck { ok: false, .. }));

        coordinator
            .unicast(
                NodeId(1),
                PROTOCOL,
                Envelope::Task {
                    correlation: CorrelationId(1),
                    operation: "ping".to_string(),
                    payload: json!({}),
                },
            )
            .await
            .unwrap();
        let (_, env) = coordinator
            .recv(PROTOCOL, Duration::from_millis(500))
            .await
            .unwrap();
        match env {
            Envelope::TaskResult { reply, .. } => {
                assert_eq!(reply, TaskReply::Error("no role assigned".to_string()));
            }
            other => panic!("wrong envelope: {other:?}"),
        }

        coordinator
            .unicast(NodeId(1), PROTOCOL, Envelope::Shutdown)
            .await
            .unwrap();
        handle.await.unwrap().unwrap();
    }
}
