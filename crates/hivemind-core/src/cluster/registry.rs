//! Node discovery over the broadcast channel.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use hivemind_proto::{Envelope, PROTOCOL};

use crate::bus::{BusError, MessageBus};
use crate::state::Node;

/// Broadcast a discovery request and collect availability replies for the
/// whole `window`.
///
/// Returns nodes in arrival order; positional role pairing depends on it.
/// Duplicate replies from an already-seen node are ignored, as are frames
/// that are not availability replies. An empty result is a valid outcome,
/// not an error; the caller decides whether to abort.
pub async fn discover(bus: &dyn MessageBus, window: Duration) -> Result<Vec<Node>, BusError> {
    bus.broadcast(
        PROTOCOL,
        Envelope::Discover {
            coordinator: bus.node_id(),
        },
    )
    .await?;

    let deadline = Instant::now() + window;
    let mut seen = HashSet::new();
    let mut nodes = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match bus.recv(PROTOCOL, remaining).await {
            Ok((from, Envelope::WorkerAvailable)) => {
                if seen.insert(from) {
                    info!(%from, "worker discovered");
                    nodes.push(Node::discovered(from));
                } else {
                    debug!(%from, "duplicate availability reply ignored");
                }
            }
            Ok((from, _)) => {
                debug!(%from, "non-discovery frame during window, ignored");
            }
            Err(BusError::Timeout) => break,
            Err(e) => return Err(e),
        }
    }

    info!(count = nodes.len(), "discovery window closed");
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryHub;
    use hivemind_proto::NodeId;

    #[tokio::test]
    async fn collects_replies_in_arrival_order() {
        let hub = MemoryHub::new();
        let coordinator = hub.endpoint(NodeId(0));
        let w1 = hub.endpoint(NodeId(11));
        let w2 = hub.endpoint(NodeId(12));

        tokio::spawn(async move {
            // w2 answers first, then w1
            let _ = w2.recv(PROTOCOL, Duration::from_millis(500)).await;
            w2.unicast(NodeId(0), PROTOCOL, Envelope::WorkerAvailable)
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = w1.recv(PROTOCOL, Duration::from_millis(500)).await;
            w1.unicast(NodeId(0), PROTOCOL, Envelope::WorkerAvailable)
                .await
                .unwrap();
        });

        let nodes = discover(&coordinator, Duration::from_millis(200))
            .await
            .unwrap();
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![NodeId(12), NodeId(11)]);
        assert!(nodes.iter().all(|n| n.discovered && !n.ready));
    }

    #[tokio::test]
    async fn duplicate_replies_count_once() {
        let hub = MemoryHub::new();
        let coordinator = hub.endpoint(NodeId(0));
        let worker = hub.endpoint(NodeId(7));

        tokio::spawn(async move {
            let _ = worker.recv(PROTOCOL, Duration::from_millis(500)).await;
            for _ in 0..4 {
                worker
                    .unicast(NodeId(0), PROTOCOL, Envelope::WorkerAvailable)
                    .await
                    .unwrap();
            }
        });

        let nodes = discover(&coordinator, Duration::from_millis(150))
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, NodeId(7));
    }

    #[tokio::test]
    async fn zero_nodes_is_a_valid_outcome() {
        let hub = MemoryHub::new();
        let coordinator = hub.endpoint(NodeId(0));

        let start = Instant::now();
        let nodes = discover(&coordinator, Duration::from_millis(80))
            .await
            .unwrap();
        assert!(nodes.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn stray_frames_are_ignored() {
        let hub = MemoryHub::new();
        let coordinator = hub.endpoint(NodeId(0));
        let worker = hub.endpoint(NodeId(7));

        tokio::spawn(async move {
            let _ = worker.recv(PROTOCOL, Duration::from_millis(500)).await;
            worker
                .unicast(NodeId(0), PROTOCOL, Envelope::Shutdown)
                .await
                .unwrap();
            worker
                .unicast(NodeId(0), PROTOCOL, Envelope::WorkerAvailable)
                .await
                .unwrap();
        });

        let nodes = discover(&coordinator, Duration::from_millis(150))
            .await
            .unwrap();
        assert_eq!(nodes.len(), 1);
    }
}
