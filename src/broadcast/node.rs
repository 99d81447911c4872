//! Blockchain node handles.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

/// Capability to submit one signed transaction to a blockchain node.
///
/// The RPC wire protocol behind this is a black box; implementations
/// wrap whatever client the deployment uses. A call should return once
/// the node has accepted or rejected the transaction.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Submits the raw signed transaction bytes.
    ///
    /// # Errors
    ///
    /// Returns the node's rejection or transport error.
    async fn send_transaction(&self, raw_tx: &[u8]) -> anyhow::Result<()>;
}

/// Fixed collection of named node handles.
///
/// Built once at startup from configuration; the set does not change at
/// runtime.
#[derive(Default, Clone)]
pub struct NodeSet {
    nodes: HashMap<String, Arc<dyn NodeClient>>,
}

impl NodeSet {
    /// Creates an empty node set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named node handle, replacing any previous handle under the
    /// same identifier.
    pub fn insert(&mut self, id: impl Into<String>, client: Arc<dyn NodeClient>) {
        self.nodes.insert(id.into(), client);
    }

    /// Returns the number of nodes in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the set contains no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over `(id, handle)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn NodeClient>)> {
        self.nodes.iter()
    }
}

impl fmt::Debug for NodeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSet")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    struct AcceptingNode;

    #[async_trait]
    impl NodeClient for AcceptingNode {
        async fn send_transaction(&self, _raw_tx: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn insert_replaces_same_id() {
        let mut set = NodeSet::new();
        assert!(set.is_empty());
        set.insert("main", Arc::new(AcceptingNode));
        set.insert("main", Arc::new(AcceptingNode));
        set.insert("backup", Arc::new(AcceptingNode));
        assert_eq!(set.len(), 2);
    }
}
