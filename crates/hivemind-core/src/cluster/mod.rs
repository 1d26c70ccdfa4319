//! Lifecycle controller - drives deploy, discovery, assignment, serving,
//! and shutdown for one cluster session.

pub mod assign;
pub mod deploy;
pub mod dispatch;
pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use hivemind_proto::{Envelope, NodeId, RoleName, PROTOCOL};

use crate::bus::MessageBus;
use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::observability::EventLog;
use crate::state::ClusterState;

use assign::AssignmentOutcome;
use dispatch::TaskDispatcher;

/// Per-role readiness as seen by operators.
#[derive(Clone, Debug)]
pub struct RoleStatus {
    pub role: RoleName,
    pub outcome: AssignmentOutcome,
}

/// Status report for every configured role.
#[derive(Clone, Debug)]
pub struct ClusterStatus {
    pub session: Uuid,
    pub roles: Vec<RoleStatus>,
}

impl ClusterStatus {
    pub fn ready_count(&self) -> usize {
        self.roles
            .iter()
            .filter(|r| matches!(r.outcome, AssignmentOutcome::Ready(_)))
            .count()
    }

    /// True when at least one configured role has no ready node.
    pub fn is_degraded(&self) -> bool {
        self.ready_count() < self.roles.len()
    }
}

/// Handle to a running cluster session.
///
/// Cheap to share: call sites clone the `Arc`-backed internals through
/// `call`, `status` and `shutdown`.
pub struct ClusterHandle {
    bus: Arc<dyn MessageBus>,
    state: Arc<ClusterState>,
    roles: Arc<HashMap<RoleName, NodeId>>,
    outcomes: Vec<(RoleName, AssignmentOutcome)>,
    dispatcher: TaskDispatcher,
    default_deadline: Duration,
    events: Option<EventLog>,
}

impl std::fmt::Debug for ClusterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterHandle")
            .field("roles", &self.roles)
            .field("outcomes", &self.outcomes)
            .field("default_deadline", &self.default_deadline)
            .finish_non_exhaustive()
    }
}

impl ClusterHandle {
    /// Issue one task to a ready role and wait for its result.
    ///
    /// `deadline` falls back to the configured default. Failures are typed
    /// and per-call; they never change the role's readiness.
    pub async fn call(
        &self,
        role: &RoleName,
        operation: &str,
        payload: Value,
        deadline: Option<Duration>,
    ) -> Result<Value, ClusterError> {
        self.dispatcher
            .call(
                role,
                operation,
                payload,
                deadline.unwrap_or(self.default_deadline),
            )
            .await
    }

    /// Per-role readiness for every configured role.
    pub fn status(&self) -> ClusterStatus {
        ClusterStatus {
            session: self.state.session,
            roles: self
                .outcomes
                .iter()
                .map(|(role, outcome)| RoleStatus {
                    role: role.clone(),
                    outcome: outcome.clone(),
                })
                .collect(),
        }
    }

    /// Stop the cluster.
    ///
    /// Sends `Shutdown` to every role-bound node fire-and-forget: delivery
    /// is best-effort and never acknowledged. In-flight calls are canceled
    /// and return `Canceled`; subsequent calls are refused.
    pub async fn shutdown(&self) {
        for (role, &node) in self.roles.iter() {
            if let Err(e) = self.bus.unicast(node, PROTOCOL, Envelope::Shutdown).await {
                warn!(%role, %node, error = %e, "shutdown send failed");
            }
        }
        self.dispatcher.shutdown().await;
        self.emit("cluster_stopped", None, None, "shutdown broadcast sent");
        info!(session = %self.state.session, "cluster stopped");
    }

    fn emit(&self, event_type: &str, role: Option<&RoleName>, node: Option<NodeId>, message: &str) {
        if let Some(log) = &self.events {
            if let Err(e) = log.emit(event_type, role, node, message) {
                warn!(error = %e, "failed to write cluster event");
            }
        }
    }
}

/// Start a cluster session: deploy the bootstrap (when given), wait for
/// listeners to settle, discover nodes, assign roles positionally, then
/// start serving tasks.
///
/// Zero discovered nodes is terminal (`NoWorkersFound`). Zero ready roles
/// is not: the cluster starts degraded and calls against unready roles
/// return `WorkerNotReady`.
pub async fn start_cluster(
    bus: Arc<dyn MessageBus>,
    config: ClusterConfig,
    bootstrap: Option<Vec<u8>>,
) -> Result<ClusterHandle, ClusterError> {
    let mut state = ClusterState::new();
    let events = config
        .events_path
        .clone()
        .map(|path| EventLog::new(path, state.session));
    let emit = |log: &Option<EventLog>, event_type: &str, message: &str| {
        if let Some(log) = log {
            if let Err(e) = log.emit(event_type, None, None, message) {
                warn!(error = %e, "failed to write cluster event");
            }
        }
    };

    info!(session = %state.session, "starting cluster");
    emit(&events, "cluster_starting", "startup sequence begun");

    if let Some(payload) = bootstrap {
        let targets = bus.attached_nodes();
        let outcomes =
            deploy::deploy(bus.as_ref(), &targets, &config.bootstrap_path, &payload).await;
        for (node, outcome) in &outcomes {
            info!(%node, ?outcome, "deploy outcome");
        }
        emit(
            &events,
            "deploy_finished",
            &format!("{} nodes targeted", outcomes.len()),
        );
        // Freshly deployed listeners need time to come up before discovery.
        tokio::time::sleep(config.settle_delay()).await;
    }

    let nodes = registry::discover(bus.as_ref(), config.discovery_window()).await?;
    if nodes.is_empty() {
        emit(&events, "discovery_empty", "no workers found");
        return Err(ClusterError::NoWorkersFound);
    }
    for node in &nodes {
        state.record_discovered(node.id);
    }

    let outcomes = assign::assign_roles(
        bus.as_ref(),
        &mut state,
        &nodes,
        &config.roles,
        config.assign_attempt_timeout(),
        config.assign_retry_budget,
    )
    .await;

    let ready = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, AssignmentOutcome::Ready(_)))
        .count();
    if ready == 0 {
        warn!("no roles became ready; cluster is fully degraded");
    } else if ready < outcomes.len() {
        warn!(
            ready,
            configured = outcomes.len(),
            "cluster started degraded"
        );
    }
    if let Some(log) = &events {
        for (role, outcome) in &outcomes {
            let (event_type, node) = match outcome {
                AssignmentOutcome::Ready(node) => ("role_ready", Some(*node)),
                AssignmentOutcome::NoWorker => ("role_no_worker", None),
                AssignmentOutcome::Down(_) => ("role_down", None),
            };
            if let Err(e) = log.emit(event_type, Some(role), node, &format!("{outcome:?}")) {
                warn!(error = %e, "failed to write cluster event");
            }
        }
    }

    let roles = Arc::new(state.roles_by_name.clone());
    let state = Arc::new(state);
    let dispatcher = TaskDispatcher::start(
        Arc::clone(&bus),
        Arc::clone(&state),
        Arc::clone(&roles),
        config.recv_poll(),
    );

    emit(&events, "cluster_started", &format!("{ready} roles ready"));
    info!(session = %state.session, ready, "cluster serving");

    Ok(ClusterHandle {
        bus,
        state,
        roles,
        outcomes,
        dispatcher,
        default_deadline: config.task_default_deadline(),
        events,
    })
}
