//! Bootstrap deployment to worker nodes.
//!
//! Fast path: write the payload onto the node's storage and trigger it,
//! when the transport has the node attached. Otherwise fall back to a
//! `Deploy` message with the execute flag, which only works if the remote
//! side is already listening. Attempts are independent; one node failing
//! never aborts the batch.

use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use tracing::{debug, info, warn};

use hivemind_proto::{Envelope, NodeId, PROTOCOL};

use crate::bus::MessageBus;

/// Per-node deployment outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Payload written and triggered via the direct capability
    Pushed,
    /// Direct path unavailable or failed; payload sent as a message
    FallbackSent,
    /// Both paths failed
    Failed(String),
}

/// Deploy `payload` (installed at `path`) to every target node.
pub async fn deploy(
    bus: &dyn MessageBus,
    targets: &[NodeId],
    path: &str,
    payload: &[u8],
) -> HashMap<NodeId, DeployOutcome> {
    let attached: HashSet<NodeId> = bus.attached_nodes().into_iter().collect();

    let attempts = targets.iter().map(|&node| {
        let direct = attached.contains(&node);
        async move { (node, deploy_one(bus, node, direct, path, payload).await) }
    });

    let outcomes: HashMap<NodeId, DeployOutcome> = join_all(attempts).await.into_iter().collect();
    info!(
        total = outcomes.len(),
        pushed = outcomes.values().filter(|o| **o == DeployOutcome::Pushed).count(),
        "deployment batch finished"
    );
    outcomes
}

async fn deploy_one(
    bus: &dyn MessageBus,
    node: NodeId,
    direct: bool,
    path: &str,
    payload: &[u8],
) -> DeployOutcome {
    if direct {
        match push_and_start(bus, node, path, payload).await {
            Ok(()) => {
                info!(%node, "bootstrap pushed via direct attachment");
                return DeployOutcome::Pushed;
            }
            Err(e) => {
                warn!(%node, error = %e, "direct push failed, falling back to message");
            }
        }
    } else {
        debug!(%node, "no direct attachment, using message fallback");
    }

    match bus
        .unicast(
            node,
            PROTOCOL,
            Envelope::Deploy {
                payload: payload.to_vec(),
                execute: true,
            },
        )
        .await
    {
        Ok(()) => DeployOutcome::FallbackSent,
        Err(e) => {
            warn!(%node, error = %e, "deployment failed on both paths");
            DeployOutcome::Failed(e.to_string())
        }
    }
}

async fn push_and_start(
    bus: &dyn MessageBus,
    node: NodeId,
    path: &str,
    payload: &[u8],
) -> Result<(), crate::bus::BusError> {
    bus.push_file(node, path, payload).await?;
    bus.execute(node, path).await
}
