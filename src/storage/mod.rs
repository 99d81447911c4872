//! Storage layer: versioned snapshots, the activity ledger, intermediate
//! transaction buckets, and trade history.
//!
//! The traits in this module are the seams between the lifecycle core and
//! the storage engine. Two backends implement them: [`PostgresStorage`]
//! for production (all multi-step writes run inside a database
//! transaction) and [`MemoryStorage`] for tests and local development.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::domain::{ActivityId, ActivityParams, ActivityRecord, ActivityResult};
use crate::domain::{ActivityAction, SnapshotCategory, TradeEntry, TxEntry, Version};
use crate::error::ReserveError;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

/// Append-only, monotonically versioned store of market-data snapshots.
///
/// Records are partitioned by [`SnapshotCategory`]; versions reflect
/// insertion order and are never reused. Written records are immutable,
/// only superseded by later versions or pruned after retention expiry.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Appends a new snapshot and returns its assigned version.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence failure or
    /// [`ReserveError::Validation`] on an out-of-range timestamp. Data is
    /// never silently dropped.
    async fn store(
        &self,
        category: SnapshotCategory,
        payload: serde_json::Value,
        timepoint: u64,
    ) -> Result<Version, ReserveError>;

    /// Returns the greatest version of `category` created at or before
    /// `timepoint`. This is the "as-of" read pricing relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::NotFound`] if the category has never been
    /// written at or before that time.
    async fn current_version(
        &self,
        category: SnapshotCategory,
        timepoint: u64,
    ) -> Result<Version, ReserveError>;

    /// Fetches the payload stored at an exact version.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::NotFound`] if the version does not exist
    /// or belongs to a different category.
    async fn get(
        &self,
        category: SnapshotCategory,
        version: Version,
    ) -> Result<serde_json::Value, ReserveError>;

    /// Returns all payloads of `category` created in the inclusive
    /// window `[from, to]`. Callers are responsible for bounding the
    /// window width.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence failure.
    async fn range(
        &self,
        category: SnapshotCategory,
        from: u64,
        to: u64,
    ) -> Result<Vec<serde_json::Value>, ReserveError>;

    /// Streams every payload of `category` older than
    /// `timepoint - retention_ms` to `sink`, one JSON line per record,
    /// without deleting anything. Intended to run right before
    /// [`SnapshotStore::prune_expired`] as a backup step; both query the
    /// same cutoff predicate. Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence or sink I/O
    /// failure.
    async fn export_expired(
        &self,
        category: SnapshotCategory,
        timepoint: u64,
        retention_ms: u64,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, ReserveError>;

    /// Deletes every record of `category` older than
    /// `timepoint - retention_ms` and returns the deleted count. Safe to
    /// run concurrently with [`SnapshotStore::store`]: only records
    /// strictly older than the cutoff are touched.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence failure.
    async fn prune_expired(
        &self,
        category: SnapshotCategory,
        timepoint: u64,
        retention_ms: u64,
    ) -> Result<u64, ReserveError>;
}

/// Permanent ledger of reserve operations.
///
/// Per record the state machine is `pending -> settled`, terminal.
/// Records are never deleted; the ledger is the audit history.
#[async_trait]
pub trait ActivityLedger: Send + Sync {
    /// Inserts a new pending activity record.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Conflict`] if a record with the same id
    /// already exists, or [`ReserveError::Storage`] on persistence
    /// failure.
    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        action: ActivityAction,
        id: ActivityId,
        destination: &str,
        params: ActivityParams,
        result: ActivityResult,
        exchange_status: &str,
        mining_status: &str,
        timepoint: u64,
    ) -> Result<(), ReserveError>;

    /// Settles the activity with the given id.
    ///
    /// Absent id is a no-op success (the settlement feed may race record
    /// visibility). A `record` that is still pending is also a no-op, so
    /// a settled activity can never be un-settled and redundant writes
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence failure.
    async fn update_activity(
        &self,
        id: &ActivityId,
        record: ActivityRecord,
    ) -> Result<(), ReserveError>;

    /// Fetches one activity record by id.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::NotFound`] if no record with the id
    /// exists.
    async fn get_activity(&self, id: &ActivityId) -> Result<ActivityRecord, ReserveError>;

    /// Returns all records still pending, in arbitrary order. The
    /// settlement reconciler processes the full set each poll cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence failure.
    async fn pending_activities(&self) -> Result<Vec<ActivityRecord>, ReserveError>;

    /// Returns every record created in the inclusive window `[from, to]`
    /// regardless of pending state.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence failure.
    async fn all_records(&self, from: u64, to: u64) -> Result<Vec<ActivityRecord>, ReserveError>;

    /// Returns `true` iff some pending deposit targets `exchange` with
    /// `params.asset == asset`. This is the admission-control guard
    /// against submitting two concurrent deposits for the same pair.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence failure.
    async fn has_pending_deposit(
        &self,
        asset: &str,
        exchange: &str,
    ) -> Result<bool, ReserveError>;

    /// Among pending rate updates whose nonce is at or above
    /// `mined_nonce`, returns the one next expected to confirm (smallest
    /// such nonce) together with the count of those still awaited. Used
    /// to hold the single-in-flight-rate-update invariant.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence failure.
    async fn pending_set_rate(
        &self,
        mined_nonce: u64,
    ) -> Result<(Option<ActivityRecord>, u64), ReserveError> {
        let pendings = self.pending_activities().await?;
        Ok(first_pending_set_rate(pendings, mined_nonce))
    }
}

/// Two-bucket store for intermediate deposit transactions.
///
/// A given id's entry is in at most one of the two buckets at any time:
/// pending from broadcast until observed mined, confirmed afterwards.
/// Promotion moves the entry atomically; readers never observe the id in
/// both buckets or in neither (after first insertion).
#[async_trait]
pub trait IntermediateTxStore: Send + Sync {
    /// Inserts or overwrites `entry` in the pending bucket. Re-storing
    /// the same id overwrites (resubmission with updated gas/nonce).
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence failure.
    async fn store_pending_tx(&self, id: &ActivityId, entry: TxEntry)
    -> Result<(), ReserveError>;

    /// Atomically inserts `entry` into the confirmed bucket (keyed by
    /// [`ActivityId::to_bytes`]) and removes `id` from the pending
    /// bucket. On failure neither step is visible, so retrying with the
    /// same arguments is safe.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence failure; state
    /// is guaranteed unchanged in that case.
    async fn promote_tx(&self, id: &ActivityId, entry: TxEntry) -> Result<(), ReserveError>;

    /// Fetches the confirmed entry for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::NotFound`] if the transaction has not
    /// been promoted yet; callers poll and retry later.
    async fn confirmed_tx(&self, id: &ActivityId) -> Result<TxEntry, ReserveError>;

    /// Returns a full snapshot of the pending bucket, keyed by id.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence failure.
    async fn pending_txs(&self) -> Result<HashMap<ActivityId, TxEntry>, ReserveError>;
}

/// Per-pair exchange trade history with a bounded query window.
#[async_trait]
pub trait TradeHistoryStore: Send + Sync {
    /// Upserts trade rows, grouped by trading-pair id. Re-storing a
    /// trade with the same `(pair, timestamp, trade_id)` key overwrites
    /// it, so repeated fetch cycles are idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence failure.
    async fn store_trade_history(
        &self,
        history: HashMap<u64, Vec<TradeEntry>>,
    ) -> Result<(), ReserveError>;

    /// Returns trades per pair executed in the inclusive window
    /// `[from, to]`. The window is capped (3 days by default) to protect
    /// against unbounded scans.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Validation`] if the window exceeds the
    /// configured maximum (no partial read is performed), or
    /// [`ReserveError::Storage`] on persistence failure.
    async fn trade_history(
        &self,
        from: u64,
        to: u64,
    ) -> Result<HashMap<u64, Vec<TradeEntry>>, ReserveError>;
}

/// Picks the pending rate update next expected to confirm.
///
/// Filters `pendings` down to rate updates with a nonce at or above
/// `mined_nonce`, returns the record with the smallest such nonce and the
/// count of matches. Entries without a nonce never match (they cannot be
/// correlated with mining progress).
fn first_pending_set_rate(
    pendings: Vec<ActivityRecord>,
    mined_nonce: u64,
) -> (Option<ActivityRecord>, u64) {
    let mut first: Option<ActivityRecord> = None;
    let mut count = 0u64;
    for record in pendings {
        if record.action != ActivityAction::SetRate {
            continue;
        }
        let Some(nonce) = record.result.nonce else {
            continue;
        };
        if nonce < mined_nonce {
            continue;
        }
        count += 1;
        let replace = match &first {
            Some(current) => current.result.nonce.is_none_or(|n| nonce < n),
            None => true,
        };
        if replace {
            first = Some(record);
        }
    }
    (first, count)
}

/// Validates a `[from, to]` window against a maximum width.
///
/// Shared by both trade-history backends so the Validation error fires
/// before any row is read.
fn check_trade_window(from: u64, to: u64, max_window_ms: u64) -> Result<(), ReserveError> {
    if to < from {
        return Err(ReserveError::Validation(format!(
            "invalid time range: from {from} is after to {to}"
        )));
    }
    if to - from > max_window_ms {
        return Err(ReserveError::Validation(format!(
            "time range is too broad, it must be smaller or equal to {max_window_ms} ms"
        )));
    }
    Ok(())
}
