//! Domain layer: core types for activities, snapshots, and intermediate
//! transactions.
//!
//! This module contains the persisted data model: activity identity and
//! records, versioned snapshot categories, intermediate transaction
//! entries, and exchange trade history rows.

pub mod activity;
pub mod snapshot;
pub mod trade;
pub mod tx_entry;

pub use activity::{ActivityAction, ActivityId, ActivityParams, ActivityRecord, ActivityResult};
pub use snapshot::{SnapshotCategory, SnapshotRecord, Version};
pub use trade::TradeEntry;
pub use tx_entry::TxEntry;
