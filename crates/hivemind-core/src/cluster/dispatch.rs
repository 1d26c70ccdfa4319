//! Task dispatch with correlation-id demultiplexing.
//!
//! One receive task owns the bus inbox once the cluster is serving and
//! routes `TaskResult` frames to per-call oneshot waiters keyed by
//! correlation id, so any number of calls can be in flight without
//! cross-talk. Results with no registered waiter (late, duplicate, or
//! foreign) are logged and dropped.
//!
//! The dispatcher never retries and never changes a role's readiness on
//! failure; both are caller policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, warn};

use hivemind_proto::{CorrelationId, Envelope, NodeId, RoleName, TaskReply, PROTOCOL};

use crate::bus::{BusError, MessageBus};
use crate::error::ClusterError;
use crate::state::ClusterState;

type Waiters = Arc<Mutex<HashMap<CorrelationId, oneshot::Sender<TaskReply>>>>;

/// Issues correlated request/response calls to ready roles.
pub struct TaskDispatcher {
    bus: Arc<dyn MessageBus>,
    state: Arc<ClusterState>,
    /// Immutable snapshot taken after assignment; safe for concurrent reads
    roles: Arc<HashMap<RoleName, NodeId>>,
    waiters: Waiters,
    shutdown: watch::Sender<bool>,
}

impl TaskDispatcher {
    /// Spawn the demultiplexing receive task and return the dispatcher.
    ///
    /// Must not be called before assignment completes: from this point on
    /// the receive task owns the bus inbox.
    pub fn start(
        bus: Arc<dyn MessageBus>,
        state: Arc<ClusterState>,
        roles: Arc<HashMap<RoleName, NodeId>>,
        recv_poll: Duration,
    ) -> Self {
        let waiters: Waiters = Arc::new(Mutex::new(HashMap::new()));
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(demux_loop(
            Arc::clone(&bus),
            Arc::clone(&waiters),
            shutdown_rx,
            recv_poll,
        ));

        Self {
            bus,
            state,
            roles,
            waiters,
            shutdown,
        }
    }

    /// Send one task to the role's bound node and wait for its result.
    ///
    /// Fails immediately with `WorkerNotReady` if the role has no ready
    /// node; nothing is sent in that case. Returns `TaskTimeout` when no
    /// matching result arrives within `deadline`, and `Canceled` if the
    /// cluster shuts down while the call is in flight.
    pub async fn call(
        &self,
        role: &RoleName,
        operation: &str,
        payload: Value,
        deadline: Duration,
    ) -> Result<Value, ClusterError> {
        if *self.shutdown.borrow() {
            return Err(ClusterError::Canceled);
        }
        let node = self
            .roles
            .get(role)
            .copied()
            .filter(|_| self.state.ready_node(role).is_some())
            .ok_or_else(|| ClusterError::WorkerNotReady(role.clone()))?;

        let correlation = self.state.next_correlation();
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(correlation, tx);

        let task = Envelope::Task {
            correlation,
            operation: operation.to_string(),
            payload,
        };
        if let Err(e) = self.bus.unicast(node, PROTOCOL, task).await {
            self.waiters.lock().await.remove(&correlation);
            return Err(e.into());
        }
        debug!(%role, %node, %correlation, operation, "task dispatched");

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(TaskReply::Ok(value))) => Ok(value),
            Ok(Ok(TaskReply::Error(reason))) => Err(ClusterError::WorkerError {
                role: role.clone(),
                reason,
            }),
            // Waiter dropped without a reply: shutdown canceled the call.
            Ok(Err(_)) => Err(ClusterError::Canceled),
            Err(_) => {
                self.waiters.lock().await.remove(&correlation);
                Err(ClusterError::TaskTimeout {
                    role: role.clone(),
                    correlation,
                })
            }
        }
    }

    /// Stop the receive task and cancel in-flight calls.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        // Dropping the senders wakes every pending call with `Canceled`.
        self.waiters.lock().await.clear();
    }
}

async fn demux_loop(
    bus: Arc<dyn MessageBus>,
    waiters: Waiters,
    mut shutdown: watch::Receiver<bool>,
    recv_poll: Duration,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("demux loop stopping");
                    return;
                }
            }
            received = bus.recv(PROTOCOL, recv_poll) => match received {
                Ok((from, Envelope::TaskResult { correlation, reply })) => {
                    match waiters.lock().await.remove(&correlation) {
                        Some(tx) => {
                            // A receiver gone means the call already timed out.
                            let _ = tx.send(reply);
                        }
                        None => {
                            debug!(%from, %correlation, "result with no pending call, dropped");
                        }
                    }
                }
                Ok((from, _)) => {
                    debug!(%from, "non-result frame while serving, ignored");
                }
                Err(BusError::Timeout) => {}
                Err(BusError::Closed) => {
                    warn!("bus closed, demux loop stopping");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "bus error in demux loop");
                }
            }
        }
    }
}
