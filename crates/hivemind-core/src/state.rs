//! Cluster state - nodes, role bindings, correlation allocation.
//!
//! One explicit `ClusterState` owned by the lifecycle controller. It is
//! mutated only during the single-threaded startup phase; after startup the
//! task dispatcher reads an immutable role snapshot and allocates
//! correlation ids through the atomic counter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;
use uuid::Uuid;

use hivemind_proto::{CorrelationId, NodeId, RoleName};

/// A discovered peer. Never deleted, only marked not-ready.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub discovered: bool,
    pub role: Option<RoleName>,
    pub ready: bool,
}

impl Node {
    pub fn discovered(id: NodeId) -> Self {
        Self {
            id,
            discovered: true,
            role: None,
            ready: false,
        }
    }
}

/// Process-wide aggregate for one cluster session.
#[derive(Debug)]
pub struct ClusterState {
    pub session: Uuid,
    pub nodes: HashMap<NodeId, Node>,
    pub roles_by_name: HashMap<RoleName, NodeId>,
    next_correlation: AtomicU64,
}

impl ClusterState {
    pub fn new() -> Self {
        Self {
            session: Uuid::new_v4(),
            nodes: HashMap::new(),
            roles_by_name: HashMap::new(),
            next_correlation: AtomicU64::new(1),
        }
    }

    /// Allocate the next correlation id. Monotonic, never reused in a session.
    pub fn next_correlation(&self) -> CorrelationId {
        CorrelationId(self.next_correlation.fetch_add(1, Ordering::Relaxed))
    }

    pub fn record_discovered(&mut self, id: NodeId) {
        self.nodes.entry(id).or_insert_with(|| Node::discovered(id));
    }

    /// Bind a role to a node and mark it ready.
    ///
    /// Returns false without binding if the node already carries a role:
    /// `roles_by_name` must never map two roles to the same node.
    pub fn bind_role(&mut self, role: RoleName, id: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            warn!(%id, %role, "bind_role for unknown node, ignored");
            return false;
        };
        if node.role.is_some() {
            warn!(%id, %role, "node already bound to a role, ignored");
            return false;
        }
        node.role = Some(role.clone());
        node.ready = true;
        self.roles_by_name.insert(role, id);
        true
    }

    /// Node bound to a role, if it is ready.
    pub fn ready_node(&self, role: &RoleName) -> Option<NodeId> {
        let id = self.roles_by_name.get(role)?;
        self.nodes.get(id).filter(|n| n.ready).map(|n| n.id)
    }
}

impl Default for ClusterState {
    fn default() -> Self {
        Self::new()
    }
}
