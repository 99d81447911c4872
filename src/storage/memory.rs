//! In-memory storage backend.
//!
//! Backs every storage trait with maps behind a single
//! [`tokio::sync::RwLock`], so multi-step writes (promotion) are atomic
//! under the write lock the same way the PostgreSQL backend relies on a
//! database transaction. Used by tests and local development.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;

use crate::domain::{
    ActivityAction, ActivityId, ActivityParams, ActivityRecord, ActivityResult, SnapshotCategory,
    SnapshotRecord, TradeEntry, TxEntry, Version,
};
use crate::error::ReserveError;

use super::{ActivityLedger, IntermediateTxStore, SnapshotStore, TradeHistoryStore};
use super::check_trade_window;

/// Default trade-history window cap: 3 days in milliseconds.
const DEFAULT_TRADE_WINDOW_MS: u64 = 3 * 86_400_000;

#[derive(Debug, Default)]
struct Inner {
    next_version: i64,
    snapshots: HashMap<SnapshotCategory, Vec<SnapshotRecord>>,
    activities: HashMap<ActivityId, ActivityRecord>,
    /// Pending bucket, keyed by the structured id (exact lookup).
    pending_txs: HashMap<ActivityId, TxEntry>,
    /// Confirmed bucket, keyed by the byte-sortable id encoding
    /// ([`ActivityId::to_bytes`]) so entries stay in `(timepoint, eid)`
    /// order for seeks.
    confirmed_txs: BTreeMap<Vec<u8>, TxEntry>,
    trades: HashMap<u64, BTreeMap<(u64, String), TradeEntry>>,
    fail_next_promotion: bool,
}

/// In-memory implementation of all storage traits.
#[derive(Debug)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
    max_trade_window_ms: u64,
}

impl MemoryStorage {
    /// Creates an empty store with the given trade-history window cap.
    #[must_use]
    pub fn new(max_trade_window_ms: u64) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_trade_window_ms,
        }
    }

    /// Makes the next `promote_tx` call fail before applying either
    /// sub-step, simulating a storage crash mid-promotion.
    #[cfg(test)]
    pub(crate) async fn inject_promotion_failure(&self) {
        self.inner.write().await.fail_next_promotion = true;
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(DEFAULT_TRADE_WINDOW_MS)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStorage {
    async fn store(
        &self,
        category: SnapshotCategory,
        payload: serde_json::Value,
        timepoint: u64,
    ) -> Result<Version, ReserveError> {
        let mut inner = self.inner.write().await;
        inner.next_version += 1;
        let version = Version::new(inner.next_version);
        inner.snapshots.entry(category).or_default().push(SnapshotRecord {
            id: version,
            created: timepoint,
            category,
            payload,
        });
        Ok(version)
    }

    async fn current_version(
        &self,
        category: SnapshotCategory,
        timepoint: u64,
    ) -> Result<Version, ReserveError> {
        let inner = self.inner.read().await;
        inner
            .snapshots
            .get(&category)
            .and_then(|records| {
                records
                    .iter()
                    .filter(|r| r.created <= timepoint)
                    .max_by_key(|r| (r.created, r.id))
                    .map(|r| r.id)
            })
            .ok_or_else(|| {
                ReserveError::NotFound(format!(
                    "no {category} version at or before timestamp {timepoint}"
                ))
            })
    }

    async fn get(
        &self,
        category: SnapshotCategory,
        version: Version,
    ) -> Result<serde_json::Value, ReserveError> {
        let inner = self.inner.read().await;
        inner
            .snapshots
            .get(&category)
            .and_then(|records| records.iter().find(|r| r.id == version))
            .map(|r| r.payload.clone())
            .ok_or_else(|| {
                ReserveError::NotFound(format!("no {category} snapshot at version {version}"))
            })
    }

    async fn range(
        &self,
        category: SnapshotCategory,
        from: u64,
        to: u64,
    ) -> Result<Vec<serde_json::Value>, ReserveError> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .get(&category)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.created >= from && r.created <= to)
                    .map(|r| r.payload.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn export_expired(
        &self,
        category: SnapshotCategory,
        timepoint: u64,
        retention_ms: u64,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, ReserveError> {
        let cutoff = timepoint.saturating_sub(retention_ms);
        let expiring: Vec<serde_json::Value> = {
            let inner = self.inner.read().await;
            inner
                .snapshots
                .get(&category)
                .map(|records| {
                    records
                        .iter()
                        .filter(|r| r.created < cutoff)
                        .map(|r| r.payload.clone())
                        .collect()
                })
                .unwrap_or_default()
        };
        let mut count = 0u64;
        for payload in expiring {
            let mut line = serde_json::to_vec(&payload)?;
            line.push(b'\n');
            sink.write_all(&line)
                .await
                .map_err(|e| ReserveError::storage("export snapshots", e))?;
            count += 1;
        }
        Ok(count)
    }

    async fn prune_expired(
        &self,
        category: SnapshotCategory,
        timepoint: u64,
        retention_ms: u64,
    ) -> Result<u64, ReserveError> {
        let cutoff = timepoint.saturating_sub(retention_ms);
        let mut inner = self.inner.write().await;
        let Some(records) = inner.snapshots.get_mut(&category) else {
            return Ok(0);
        };
        let before = records.len();
        records.retain(|r| r.created >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

#[async_trait]
impl ActivityLedger for MemoryStorage {
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
    ) -> Result<(), ReserveError> {
        let mut inner = self.inner.write().await;
        if inner.activities.contains_key(&id) {
            return Err(ReserveError::Conflict(format!("activity {id} already exists")));
        }
        let record = ActivityRecord::new(
            action,
            id.clone(),
            destination,
            params,
            result,
            exchange_status,
            mining_status,
            timepoint,
        );
        inner.activities.insert(id, record);
        Ok(())
    }

    async fn update_activity(
        &self,
        id: &ActivityId,
        record: ActivityRecord,
    ) -> Result<(), ReserveError> {
        if record.is_pending {
            return Ok(());
        }
        let mut inner = self.inner.write().await;
        if let Some(stored) = inner.activities.get_mut(id) {
            *stored = record;
        }
        Ok(())
    }

    async fn get_activity(&self, id: &ActivityId) -> Result<ActivityRecord, ReserveError> {
        let inner = self.inner.read().await;
        inner
            .activities
            .get(id)
            .cloned()
            .ok_or_else(|| ReserveError::NotFound(format!("activity {id} not found")))
    }

    async fn pending_activities(&self) -> Result<Vec<ActivityRecord>, ReserveError> {
        let inner = self.inner.read().await;
        Ok(inner
            .activities
            .values()
            .filter(|r| r.is_pending)
            .cloned()
            .collect())
    }

    async fn all_records(&self, from: u64, to: u64) -> Result<Vec<ActivityRecord>, ReserveError> {
        let inner = self.inner.read().await;
        Ok(inner
            .activities
            .values()
            .filter(|r| r.created >= from && r.created <= to)
            .cloned()
            .collect())
    }

    async fn has_pending_deposit(
        &self,
        asset: &str,
        exchange: &str,
    ) -> Result<bool, ReserveError> {
        let inner = self.inner.read().await;
        Ok(inner.activities.values().any(|r| {
            r.is_pending
                && r.action == ActivityAction::Deposit
                && r.destination == exchange
                && r.params.asset == asset
        }))
    }
}

#[async_trait]
impl IntermediateTxStore for MemoryStorage {
    async fn store_pending_tx(
        &self,
        id: &ActivityId,
        entry: TxEntry,
    ) -> Result<(), ReserveError> {
        let mut inner = self.inner.write().await;
        inner.pending_txs.insert(id.clone(), entry);
        Ok(())
    }

    async fn promote_tx(&self, id: &ActivityId, entry: TxEntry) -> Result<(), ReserveError> {
        let mut inner = self.inner.write().await;
        if inner.fail_next_promotion {
            inner.fail_next_promotion = false;
            return Err(ReserveError::storage(
                "promote intermediate tx",
                "injected write failure",
            ));
        }
        // Both steps happen under the same write lock, so readers see
        // either the pre- or post-promotion state, never a mix.
        inner.confirmed_txs.insert(id.to_bytes().to_vec(), entry);
        inner.pending_txs.remove(id);
        Ok(())
    }

    async fn confirmed_tx(&self, id: &ActivityId) -> Result<TxEntry, ReserveError> {
        let inner = self.inner.read().await;
        inner
            .confirmed_txs
            .get(id.to_bytes().as_slice())
            .cloned()
            .ok_or_else(|| {
                ReserveError::NotFound(format!(
                    "transaction for deposit {id} not yet available, retry later"
                ))
            })
    }

    async fn pending_txs(&self) -> Result<HashMap<ActivityId, TxEntry>, ReserveError> {
        let inner = self.inner.read().await;
        Ok(inner.pending_txs.clone())
    }
}

#[async_trait]
impl TradeHistoryStore for MemoryStorage {
    async fn store_trade_history(
        &self,
        history: HashMap<u64, Vec<TradeEntry>>,
    ) -> Result<(), ReserveError> {
        let mut inner = self.inner.write().await;
        for (pair, trades) in history {
            let bucket = inner.trades.entry(pair).or_default();
            for trade in trades {
                bucket.insert((trade.timestamp, trade.trade_id.clone()), trade);
            }
        }
        Ok(())
    }

    async fn trade_history(
        &self,
        from: u64,
        to: u64,
    ) -> Result<HashMap<u64, Vec<TradeEntry>>, ReserveError> {
        check_trade_window(from, to, self.max_trade_window_ms)?;
        let inner = self.inner.read().await;
        let mut result = HashMap::new();
        for (pair, bucket) in &inner.trades {
            let trades: Vec<TradeEntry> = bucket
                .values()
                .filter(|t| t.timestamp >= from && t.timestamp <= to)
                .cloned()
                .collect();
            // Pairs with no trade in the window are omitted entirely.
            if !trades.is_empty() {
                result.insert(*pair, trades);
            }
        }
        Ok(result)
    }
}
