//! Role assignment handshake.
//!
//! Pairing is strictly positional: the i-th configured role is offered to
//! the i-th discovered node. A node discovered out of order therefore gets
//! a different role; the offer order is the contract, not any metadata on
//! the role. Roles beyond the node count report `NoWorker`.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use hivemind_proto::{Envelope, NodeId, RoleDefinition, RoleName, PROTOCOL};

use crate::bus::{BusError, MessageBus};
use crate::state::{ClusterState, Node};

/// Terminal per-role outcome. `Pending` never escapes this module: a role
/// either acks into `Ready` or exhausts its retries into `Down`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssignmentOutcome {
    Ready(NodeId),
    /// More roles were configured than nodes discovered
    NoWorker,
    Down(String),
}

enum AckOutcome {
    Accepted,
    Refused(String),
}

/// Offer each configured role to its positional node and wait for the
/// acknowledgement handshake. Successful bindings are recorded in `state`.
pub async fn assign_roles(
    bus: &dyn MessageBus,
    state: &mut ClusterState,
    nodes: &[Node],
    roles: &[RoleDefinition],
    attempt_timeout: Duration,
    retry_budget: u32,
) -> Vec<(RoleName, AssignmentOutcome)> {
    let mut outcomes = Vec::with_capacity(roles.len());

    for (index, role) in roles.iter().enumerate() {
        let outcome = match nodes.get(index) {
            None => {
                warn!(role = %role.name, "no worker available for role");
                AssignmentOutcome::NoWorker
            }
            Some(node) => offer_role(bus, node.id, role, attempt_timeout, retry_budget).await,
        };

        if let AssignmentOutcome::Ready(id) = outcome {
            state.bind_role(role.name.clone(), id);
        }
        outcomes.push((role.name.clone(), outcome));
    }

    outcomes
}

/// Send the offer and wait for an ack, retrying up to the budget.
async fn offer_role(
    bus: &dyn MessageBus,
    node: NodeId,
    role: &RoleDefinition,
    attempt_timeout: Duration,
    retry_budget: u32,
) -> AssignmentOutcome {
    for attempt in 1..=retry_budget {
        let offer = Envelope::AssignRole {
            role: role.name.clone(),
            manifest: role.manifest.clone(),
        };
        if let Err(e) = bus.unicast(node, PROTOCOL, offer).await {
            warn!(%node, role = %role.name, error = %e, "failed to send role offer");
            return AssignmentOutcome::Down(e.to_string());
        }

        match await_ack(bus, node, &role.name, attempt_timeout).await {
            Some(AckOutcome::Accepted) => {
                info!(%node, role = %role.name, attempt, "role acknowledged");
                return AssignmentOutcome::Ready(node);
            }
            Some(AckOutcome::Refused(reason)) => {
                warn!(%node, role = %role.name, %reason, "role refused");
                return AssignmentOutcome::Down(reason);
            }
            None => {
                debug!(%node, role = %role.name, attempt, "ack timeout, retrying");
            }
        }
    }

    warn!(%node, role = %role.name, retry_budget, "assignment retries exhausted");
    AssignmentOutcome::Down("timeout".to_string())
}

/// Wait for an ack from `node` about `role` within one attempt window.
///
/// The original install handshake reports completion as
/// `InstallComplete` / `InstallError`; those count as positive/negative
/// acks here. Unrelated frames are ignored.
async fn await_ack(
    bus: &dyn MessageBus,
    node: NodeId,
    role: &RoleName,
    attempt_timeout: Duration,
) -> Option<AckOutcome> {
    let deadline = Instant::now() + attempt_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match bus.recv(PROTOCOL, remaining).await {
            Ok((from, envelope)) if from == node => match envelope {
                Envelope::RoleAck { role: acked, ok } if acked == *role => {
                    return Some(if ok {
                        AckOutcome::Accepted
                    } else {
                        AckOutcome::Refused("refused".to_string())
                    });
                }
                Envelope::InstallComplete { role: acked } if acked == *role => {
                    return Some(AckOutcome::Accepted);
                }
                Envelope::InstallError { role: acked, reason } if acked == *role => {
                    return Some(AckOutcome::Refused(reason));
                }
                other => {
                    debug!(%from, "unrelated frame during assignment, ignored: {other:?}");
                }
            },
            Ok((from, _)) => {
                debug!(%from, "frame from non-offered node during assignment, ignored");
            }
            Err(BusError::Timeout) => return None,
            Err(e) => {
                warn!(error = %e, "bus error while awaiting ack");
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryHub;

    fn roles(names: &[&str]) -> Vec<RoleDefinition> {
        names.iter().map(|n| RoleDefinition::new(*n)).collect()
    }

    fn discovered(ids: &[u64]) -> Vec<Node> {
        ids.iter().map(|&id| Node::discovered(NodeId(id))).collect()
    }

    /// Worker that acks every offered role.
    async fn agreeable_worker(bus: crate::bus::memory::MemoryBus) {
        loop {
            match bus.recv(PROTOCOL, Duration::from_secs(2)).await {
                Ok((from, Envelope::AssignRole { role, .. })) => {
                    bus.unicast(from, PROTOCOL, Envelope::RoleAck { role, ok: true })
                        .await
                        .unwrap();
                }
                _ => break,
            }
        }
    }

    #[tokio::test]
    async fn positional_pairing_with_excess_roles() {
        let hub = MemoryHub::new();
        let coordinator = hub.endpoint(NodeId(0));
        for id in [1, 2, 3] {
            let worker = hub.endpoint(NodeId(id));
            tokio::spawn(agreeable_worker(worker));
        }

        let mut state = ClusterState::new();
        let nodes = discovered(&[1, 2, 3]);
        for n in &nodes {
            state.record_discovered(n.id);
        }

        let outcomes = assign_roles(
            &coordinator,
            &mut state,
            &nodes,
            &roles(&["memory", "generation", "mood", "speech"]),
            Duration::from_millis(300),
            2,
        )
        .await;

        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes[0].1, AssignmentOutcome::Ready(NodeId(1)));
        assert_eq!(outcomes[1].1, AssignmentOutcome::Ready(NodeId(2)));
        assert_eq!(outcomes[2].1, AssignmentOutcome::Ready(NodeId(3)));
        assert_eq!(outcomes[3].1, AssignmentOutcome::NoWorker);

        assert_eq!(
            state.ready_node(&RoleName::new("memory")),
            Some(NodeId(1))
        );
        assert_eq!(
            state.ready_node(&RoleName::new("mood")),
            Some(NodeId(3))
        );
    }

    #[tokio::test]
    async fn silent_node_exhausts_retries_into_down() {
        let hub = MemoryHub::new();
        let coordinator = hub.endpoint(NodeId(0));
        hub.endpoint(NodeId(1)); // never answers

        let mut state = ClusterState::new();
        let nodes = discovered(&[1]);
        state.record_discovered(NodeId(1));

        let start = Instant::now();
        let outcomes = assign_roles(
            &coordinator,
            &mut state,
            &nodes,
            &roles(&["memory"]),
            Duration::from_millis(50),
            3,
        )
        .await;

        assert_eq!(outcomes[0].1, AssignmentOutcome::Down("timeout".to_string()));
        // three attempts of 50ms each
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert_eq!(state.ready_node(&RoleName::new("memory")), None);
    }

    #[tokio::test]
    async fn refusal_is_down_without_retry() {
        let hub = MemoryHub::new();
        let coordinator = hub.endpoint(NodeId(0));
        let worker = hub.endpoint(NodeId(1));

        tokio::spawn(async move {
            if let Ok((from, Envelope::AssignRole { role, .. })) =
                worker.recv(PROTOCOL, Duration::from_secs(1)).await
            {
                worker
                    .unicast(from, PROTOCOL, Envelope::RoleAck { role, ok: false })
                    .await
                    .unwrap();
            }
        });

        let mut state = ClusterState::new();
        let nodes = discovered(&[1]);
        state.record_discovered(NodeId(1));

        let outcomes = assign_roles(
            &coordinator,
            &mut state,
            &nodes,
            &roles(&["memory"]),
            Duration::from_millis(300),
            5,
        )
        .await;

        assert_eq!(outcomes[0].1, AssignmentOutcome::Down("refused".to_string()));
    }

    #[tokio::test]
    async fn install_complete_counts_as_ack() {
        let hub = MemoryHub::new();
        let coordinator = hub.endpoint(NodeId(0));
        let worker = hub.endpoint(NodeId(1));

        tokio::spawn(async move {
            if let Ok((from, Envelope::AssignRole { role, .. })) =
                worker.recv(PROTOCOL, Duration::from_secs(1)).await
            {
                worker
                    .unicast(from, PROTOCOL, Envelope::InstallComplete { role })
                    .await
                    .unwrap();
            }
        });

        let mut state = ClusterState::new();
        let nodes = discovered(&[1]);
        state.record_discovered(NodeId(1));

        let outcomes = assign_roles(
            &coordinator,
            &mut state,
            &nodes,
            &roles(&["memory"]),
            Duration::from_millis(300),
            2,
        )
        .await;

        assert_eq!(outcomes[0].1, AssignmentOutcome::Ready(NodeId(1)));
    }
}
