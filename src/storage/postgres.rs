//! PostgreSQL implementation of the storage layer.
//!
//! Mirrors the persisted layout the rest of the system depends on:
//! snapshots live in `fetch_data` partitioned by category, activities in
//! `activity` keyed by `(timepoint, eid)`, and the two intermediate-tx
//! buckets use distinct key encodings (JSON text for pending exact
//! lookups, byte-sortable BYTEA for confirmed ordered seeks). Promotion
//! runs inside one database transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::domain::{
    ActivityAction, ActivityId, ActivityParams, ActivityRecord, ActivityResult, SnapshotCategory,
    TradeEntry, TxEntry, Version,
};
use crate::error::ReserveError;

use super::{
    ActivityLedger, IntermediateTxStore, SnapshotStore, TradeHistoryStore, check_trade_window,
};

/// Bootstrap DDL, applied idempotently at construction.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS fetch_data
(
    id BIGSERIAL PRIMARY KEY,
    created TIMESTAMPTZ NOT NULL,
    category TEXT NOT NULL,
    data JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS fetch_data_category_created_idx ON fetch_data (category, created);

CREATE TABLE IF NOT EXISTS activity
(
    id BIGSERIAL PRIMARY KEY,
    timepoint BIGINT NOT NULL,
    eid TEXT NOT NULL,
    created TIMESTAMPTZ NOT NULL,
    is_pending BOOL NOT NULL,
    data JSONB NOT NULL,
    UNIQUE (timepoint, eid)
);
CREATE INDEX IF NOT EXISTS activity_pending_idx ON activity (is_pending) WHERE is_pending IS TRUE;

CREATE TABLE IF NOT EXISTS pending_intermediate_tx
(
    id_json TEXT PRIMARY KEY,
    data JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS intermediate_tx
(
    id_bytes BYTEA PRIMARY KEY,
    data JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS trade_history
(
    pair_id BIGINT NOT NULL,
    tstamp BIGINT NOT NULL,
    trade_id TEXT NOT NULL,
    data JSONB NOT NULL,
    PRIMARY KEY (pair_id, tstamp, trade_id)
);
"#;

/// PostgreSQL-backed storage layer using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
    max_trade_window_ms: u64,
}

impl PostgresStorage {
    /// Creates the storage layer and bootstraps the schema.
    ///
    /// # Errors
    ///
    /// Returns a [`ReserveError::Storage`] if the schema cannot be
    /// applied.
    pub async fn new(pool: PgPool, max_trade_window_ms: u64) -> Result<Self, ReserveError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| ReserveError::storage("initialize schema", e))?;
        Ok(Self {
            pool,
            max_trade_window_ms,
        })
    }
}

/// Converts a millisecond epoch timepoint into a timezone-aware
/// timestamp for TIMESTAMPTZ columns.
fn millis_to_datetime(ms: u64) -> Result<DateTime<Utc>, ReserveError> {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| ReserveError::Validation(format!("timestamp {ms} is out of range")))
}

/// Converts a millisecond epoch timepoint into a BIGINT column value.
fn millis_to_bigint(ms: u64) -> Result<i64, ReserveError> {
    i64::try_from(ms)
        .map_err(|_| ReserveError::Validation(format!("timestamp {ms} is out of range")))
}

#[async_trait]
impl SnapshotStore for PostgresStorage {
    async fn store(
        &self,
        category: SnapshotCategory,
        payload: serde_json::Value,
        timepoint: u64,
    ) -> Result<Version, ReserveError> {
        let created = millis_to_datetime(timepoint)?;
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO fetch_data (created, category, data) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(created)
        .bind(category.as_str())
        .bind(&payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("store snapshot", e))?;
        Ok(Version::new(id))
    }

    async fn current_version(
        &self,
        category: SnapshotCategory,
        timepoint: u64,
    ) -> Result<Version, ReserveError> {
        let at = millis_to_datetime(timepoint)?;
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM fetch_data WHERE category = $1 AND created <= $2 \
             ORDER BY created DESC, id DESC LIMIT 1",
        )
        .bind(category.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("resolve snapshot version", e))?;
        id.map(Version::new).ok_or_else(|| {
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
        let data = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT data FROM fetch_data WHERE id = $1 AND category = $2",
        )
        .bind(version.as_i64())
        .bind(category.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("get snapshot", e))?;
        data.ok_or_else(|| {
            ReserveError::NotFound(format!("no {category} snapshot at version {version}"))
        })
    }

    async fn range(
        &self,
        category: SnapshotCategory,
        from: u64,
        to: u64,
    ) -> Result<Vec<serde_json::Value>, ReserveError> {
        let from = millis_to_datetime(from)?;
        let to = millis_to_datetime(to)?;
        sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT data FROM fetch_data WHERE category = $1 AND created >= $2 AND created <= $3 \
             ORDER BY created ASC",
        )
        .bind(category.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("range snapshots", e))
    }

    async fn export_expired(
        &self,
        category: SnapshotCategory,
        timepoint: u64,
        retention_ms: u64,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, ReserveError> {
        let cutoff = millis_to_datetime(timepoint.saturating_sub(retention_ms))?;
        let rows = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT data FROM fetch_data WHERE category = $1 AND created < $2 ORDER BY id ASC",
        )
        .bind(category.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("export snapshots", e))?;

        let mut count = 0u64;
        for payload in rows {
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
        let cutoff = millis_to_datetime(timepoint.saturating_sub(retention_ms))?;
        let result = sqlx::query("DELETE FROM fetch_data WHERE category = $1 AND created < $2")
            .bind(category.as_str())
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| ReserveError::storage("prune snapshots", e))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ActivityLedger for PostgresStorage {
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
        let created = millis_to_datetime(timepoint)?;
        let data = serde_json::to_value(&record)?;
        sqlx::query(
            "INSERT INTO activity (created, data, is_pending, timepoint, eid) \
             VALUES ($1, $2, TRUE, $3, $4)",
        )
        .bind(created)
        .bind(&data)
        .bind(millis_to_bigint(id.timepoint)?)
        .bind(&id.eid)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
                ReserveError::Conflict(format!("activity {id} already exists"))
            } else {
                ReserveError::storage("record activity", e)
            }
        })?;
        Ok(())
    }

    async fn update_activity(
        &self,
        id: &ActivityId,
        record: ActivityRecord,
    ) -> Result<(), ReserveError> {
        let timepoint = millis_to_bigint(id.timepoint)?;
        let exists = sqlx::query_scalar::<_, i32>(
            "SELECT 1 FROM activity WHERE timepoint = $1 AND eid = $2",
        )
        .bind(timepoint)
        .bind(&id.eid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("update activity", e))?;
        // Missing record or still-pending payload are defined no-ops.
        if exists.is_none() || record.is_pending {
            return Ok(());
        }

        let data = serde_json::to_value(&record)?;
        sqlx::query(
            "UPDATE activity SET is_pending = FALSE, data = $1 WHERE timepoint = $2 AND eid = $3",
        )
        .bind(&data)
        .bind(timepoint)
        .bind(&id.eid)
        .execute(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("update activity", e))?;
        Ok(())
    }

    async fn get_activity(&self, id: &ActivityId) -> Result<ActivityRecord, ReserveError> {
        let data = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT data FROM activity WHERE timepoint = $1 AND eid = $2",
        )
        .bind(millis_to_bigint(id.timepoint)?)
        .bind(&id.eid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("get activity", e))?;
        let data =
            data.ok_or_else(|| ReserveError::NotFound(format!("activity {id} not found")))?;
        Ok(serde_json::from_value(data)?)
    }

    async fn pending_activities(&self) -> Result<Vec<ActivityRecord>, ReserveError> {
        let rows = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT data FROM activity WHERE is_pending IS TRUE",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("list pending activities", e))?;
        rows.into_iter()
            .map(|data| serde_json::from_value(data).map_err(ReserveError::from))
            .collect()
    }

    async fn all_records(&self, from: u64, to: u64) -> Result<Vec<ActivityRecord>, ReserveError> {
        let from = millis_to_datetime(from)?;
        let to = millis_to_datetime(to)?;
        let rows = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT data FROM activity WHERE created >= $1 AND created <= $2",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("list activity records", e))?;
        rows.into_iter()
            .map(|data| serde_json::from_value(data).map_err(ReserveError::from))
            .collect()
    }

    async fn has_pending_deposit(
        &self,
        asset: &str,
        exchange: &str,
    ) -> Result<bool, ReserveError> {
        let rows = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT data FROM activity WHERE is_pending IS TRUE \
             AND data->>'action' = $1 AND data->>'destination' = $2",
        )
        .bind(ActivityAction::Deposit.as_str())
        .bind(exchange)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("check pending deposit", e))?;
        for data in rows {
            let record: ActivityRecord = serde_json::from_value(data)?;
            if record.params.asset == asset {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl IntermediateTxStore for PostgresStorage {
    async fn store_pending_tx(
        &self,
        id: &ActivityId,
        entry: TxEntry,
    ) -> Result<(), ReserveError> {
        let id_json = serde_json::to_string(id)?;
        let data = serde_json::to_value(&entry)?;
        sqlx::query(
            "INSERT INTO pending_intermediate_tx (id_json, data) VALUES ($1, $2) \
             ON CONFLICT (id_json) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(&id_json)
        .bind(&data)
        .execute(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("store pending intermediate tx", e))?;
        Ok(())
    }

    async fn promote_tx(&self, id: &ActivityId, entry: TxEntry) -> Result<(), ReserveError> {
        let id_json = serde_json::to_string(id)?;
        let data = serde_json::to_value(&entry)?;
        let id_bytes = id.to_bytes().to_vec();

        // Single transaction: the confirmed insert and the pending delete
        // commit together or not at all.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ReserveError::storage("promote intermediate tx", e))?;
        sqlx::query(
            "INSERT INTO intermediate_tx (id_bytes, data) VALUES ($1, $2) \
             ON CONFLICT (id_bytes) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(&id_bytes)
        .bind(&data)
        .execute(&mut *tx)
        .await
        .map_err(|e| ReserveError::storage("promote intermediate tx", e))?;
        sqlx::query("DELETE FROM pending_intermediate_tx WHERE id_json = $1")
            .bind(&id_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| ReserveError::storage("promote intermediate tx", e))?;
        tx.commit()
            .await
            .map_err(|e| ReserveError::storage("promote intermediate tx", e))?;
        Ok(())
    }

    async fn confirmed_tx(&self, id: &ActivityId) -> Result<TxEntry, ReserveError> {
        let data = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT data FROM intermediate_tx WHERE id_bytes = $1",
        )
        .bind(id.to_bytes().to_vec())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("get confirmed intermediate tx", e))?;
        let data = data.ok_or_else(|| {
            ReserveError::NotFound(format!(
                "transaction for deposit {id} not yet available, retry later"
            ))
        })?;
        Ok(serde_json::from_value(data)?)
    }

    async fn pending_txs(&self) -> Result<HashMap<ActivityId, TxEntry>, ReserveError> {
        let rows = sqlx::query_as::<_, (String, serde_json::Value)>(
            "SELECT id_json, data FROM pending_intermediate_tx",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("list pending intermediate txs", e))?;
        let mut result = HashMap::with_capacity(rows.len());
        for (id_json, data) in rows {
            let id: ActivityId = serde_json::from_str(&id_json)?;
            let entry: TxEntry = serde_json::from_value(data)?;
            result.insert(id, entry);
        }
        Ok(result)
    }
}

#[async_trait]
impl TradeHistoryStore for PostgresStorage {
    async fn store_trade_history(
        &self,
        history: HashMap<u64, Vec<TradeEntry>>,
    ) -> Result<(), ReserveError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ReserveError::storage("store trade history", e))?;
        for (pair, trades) in history {
            let pair_id = i64::try_from(pair)
                .map_err(|_| ReserveError::Validation(format!("pair id {pair} out of range")))?;
            for trade in trades {
                let data = serde_json::to_value(&trade)?;
                sqlx::query(
                    "INSERT INTO trade_history (pair_id, tstamp, trade_id, data) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (pair_id, tstamp, trade_id) DO UPDATE SET data = EXCLUDED.data",
                )
                .bind(pair_id)
                .bind(millis_to_bigint(trade.timestamp)?)
                .bind(&trade.trade_id)
                .bind(&data)
                .execute(&mut *tx)
                .await
                .map_err(|e| ReserveError::storage("store trade history", e))?;
            }
        }
        tx.commit()
            .await
            .map_err(|e| ReserveError::storage("store trade history", e))?;
        Ok(())
    }

    async fn trade_history(
        &self,
        from: u64,
        to: u64,
    ) -> Result<HashMap<u64, Vec<TradeEntry>>, ReserveError> {
        check_trade_window(from, to, self.max_trade_window_ms)?;
        let rows = sqlx::query_as::<_, (i64, serde_json::Value)>(
            "SELECT pair_id, data FROM trade_history WHERE tstamp >= $1 AND tstamp <= $2 \
             ORDER BY tstamp ASC",
        )
        .bind(millis_to_bigint(from)?)
        .bind(millis_to_bigint(to)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ReserveError::storage("get trade history", e))?;
        let mut result: HashMap<u64, Vec<TradeEntry>> = HashMap::new();
        for (pair_id, data) in rows {
            let pair = u64::try_from(pair_id)
                .map_err(|_| ReserveError::Internal(format!("negative pair id {pair_id}")))?;
            let trade: TradeEntry = serde_json::from_value(data)?;
            result.entry(pair).or_default().push(trade);
        }
        Ok(result)
    }
}
