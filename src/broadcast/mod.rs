//! Transaction rebroadcast: redundant submission to every known node.
//!
//! One signed transaction is submitted to all configured blockchain
//! nodes concurrently so that a single node's downtime or propagation
//! delay never blocks the critical path. The caller receives per-node
//! failure detail and decides how much degradation to tolerate.

pub mod node;
pub mod rebroadcaster;

pub use node::{NodeClient, NodeSet};
pub use rebroadcaster::{BroadcastError, BroadcastOutcome, Rebroadcaster};
