//! Concurrent fan-out/fan-in transaction submission.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use super::node::NodeSet;

/// Why a node's submission did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    /// The node did not answer within the per-node timeout.
    #[error("submission timed out after {0:?}")]
    Timeout(Duration),
    /// The node answered with a rejection or transport error.
    #[error("node rejected transaction: {0}")]
    Rejected(String),
}

/// Aggregated result of one broadcast invocation. Transient; never
/// persisted.
#[derive(Debug, Clone)]
pub struct BroadcastOutcome {
    /// Per-node failure detail; nodes absent from this map succeeded.
    pub failures: HashMap<String, BroadcastError>,
    /// `true` iff at least one node succeeded and at least one failed.
    /// Signals "degraded but accepted" versus "fully accepted" versus
    /// "fully rejected".
    pub partial_success: bool,
    /// Number of nodes the transaction was submitted to.
    pub attempted: usize,
}

impl BroadcastOutcome {
    /// Returns `true` if at least one node accepted the transaction.
    #[must_use]
    pub fn accepted(&self) -> bool {
        self.attempted > self.failures.len()
    }
}

/// Broadcasts a signed transaction to every node in the set as fast as
/// possible.
///
/// Each submission runs as its own task under an independent bounded
/// timeout; one slow node cannot cancel or delay its siblings beyond
/// that budget. The call is a fan-out/fan-in barrier: it returns only
/// after every submission finished or timed out.
#[derive(Debug, Clone)]
pub struct Rebroadcaster {
    nodes: NodeSet,
    timeout: Duration,
}

impl Rebroadcaster {
    /// Creates a rebroadcaster over the given node set with a per-node
    /// submission timeout.
    #[must_use]
    pub fn new(nodes: NodeSet, timeout: Duration) -> Self {
        Self { nodes, timeout }
    }

    /// Submits `raw_tx` to every node concurrently and aggregates the
    /// per-node outcomes.
    pub async fn broadcast(&self, raw_tx: &[u8]) -> BroadcastOutcome {
        let attempted = self.nodes.len();
        let submissions = self.nodes.iter().map(|(id, client)| {
            let id = id.clone();
            let client = Arc::clone(client);
            async move {
                let result = tokio::time::timeout(self.timeout, client.send_transaction(raw_tx)).await;
                let failure = match result {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(BroadcastError::Rejected(e.to_string())),
                    Err(_) => Some(BroadcastError::Timeout(self.timeout)),
                };
                (id, failure)
            }
        });

        let mut failures = HashMap::new();
        for (id, failure) in join_all(submissions).await {
            if let Some(failure) = failure {
                tracing::warn!(node = %id, error = %failure, "transaction submission failed");
                failures.insert(id, failure);
            }
        }

        let partial_success = !failures.is_empty() && failures.len() < attempted;
        tracing::info!(
            attempted,
            failed = failures.len(),
            partial_success,
            "broadcast finished"
        );
        BroadcastOutcome {
            failures,
            partial_success,
            attempted,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use async_trait::async_trait;

    use super::super::node::NodeClient;
    use super::*;

    struct AcceptingNode;

    #[async_trait]
    impl NodeClient for AcceptingNode {
        async fn send_transaction(&self, _raw_tx: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct RejectingNode;

    #[async_trait]
    impl NodeClient for RejectingNode {
        async fn send_transaction(&self, _raw_tx: &[u8]) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("nonce too low"))
        }
    }

    struct HangingNode;

    #[async_trait]
    impl NodeClient for HangingNode {
        async fn send_transaction(&self, _raw_tx: &[u8]) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(())
        }
    }

    fn timeout() -> Duration {
        Duration::from_millis(100)
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_outcome_is_partial_success() {
        let mut nodes = NodeSet::new();
        nodes.insert("good", Arc::new(AcceptingNode));
        nodes.insert("slow", Arc::new(HangingNode));
        nodes.insert("bad", Arc::new(RejectingNode));
        let rebroadcaster = Rebroadcaster::new(nodes, timeout());

        let outcome = rebroadcaster.broadcast(b"rawtx").await;

        assert!(outcome.partial_success);
        assert!(outcome.accepted());
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(
            outcome.failures.get("slow"),
            Some(&BroadcastError::Timeout(timeout()))
        );
        assert!(matches!(
            outcome.failures.get("bad"),
            Some(BroadcastError::Rejected(_))
        ));
        assert!(!outcome.failures.contains_key("good"));
    }

    #[tokio::test]
    async fn all_succeeding_is_not_partial() {
        let mut nodes = NodeSet::new();
        for id in ["a", "b", "c"] {
            nodes.insert(id, Arc::new(AcceptingNode));
        }
        let rebroadcaster = Rebroadcaster::new(nodes, timeout());

        let outcome = rebroadcaster.broadcast(b"rawtx").await;

        assert!(!outcome.partial_success);
        assert!(outcome.accepted());
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn all_failing_is_not_partial() {
        let mut nodes = NodeSet::new();
        for id in ["a", "b", "c"] {
            nodes.insert(id, Arc::new(RejectingNode));
        }
        let rebroadcaster = Rebroadcaster::new(nodes, timeout());

        let outcome = rebroadcaster.broadcast(b"rawtx").await;

        assert!(!outcome.partial_success);
        assert!(!outcome.accepted());
        assert_eq!(outcome.failures.len(), 3);
    }

    #[tokio::test]
    async fn empty_node_set_is_not_partial() {
        let rebroadcaster = Rebroadcaster::new(NodeSet::new(), timeout());
        let outcome = rebroadcaster.broadcast(b"rawtx").await;
        assert!(!outcome.partial_success);
        assert!(!outcome.accepted());
    }

    #[tokio::test(start_paused = true)]
    async fn one_slow_node_does_not_block_beyond_timeout() {
        let mut nodes = NodeSet::new();
        nodes.insert("good", Arc::new(AcceptingNode));
        nodes.insert("slow", Arc::new(HangingNode));
        let rebroadcaster = Rebroadcaster::new(nodes, timeout());

        let started = tokio::time::Instant::now();
        let outcome = rebroadcaster.broadcast(b"rawtx").await;
        // Under paused time the elapsed clock reflects exactly the awaited
        // timers: the barrier waits the per-node timeout, not the hang.
        assert!(started.elapsed() <= timeout() + Duration::from_millis(1));
        assert!(outcome.partial_success);
    }
}
