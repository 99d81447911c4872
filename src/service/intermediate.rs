//! Two-phase promotion of intermediate deposit transactions.
//!
//! A deposit that bridges through an intermediary account stages its
//! first-leg transaction in the pending bucket at broadcast time. A
//! reconciliation loop checks each staged entry against the chain and
//! promotes it into the confirmed bucket once observed mined. Promotion
//! is atomic in the store, so an entry is never visible in both buckets.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ActivityId, TxEntry};
use crate::error::ReserveError;
use crate::storage::IntermediateTxStore;

/// Chain-confirmation feed consulted during reconciliation.
#[async_trait]
pub trait ChainObserver: Send + Sync {
    /// Returns the mined form of `entry` if the chain has confirmed it,
    /// `None` while it is still in flight.
    ///
    /// # Errors
    ///
    /// Returns a [`ReserveError`] if the chain could not be queried;
    /// the reconciler skips the entry and retries next sweep.
    async fn mined(
        &self,
        id: &ActivityId,
        entry: &TxEntry,
    ) -> Result<Option<TxEntry>, ReserveError>;
}

/// Coordinates the pending -> confirmed lifecycle of intermediate
/// transactions on top of an [`IntermediateTxStore`].
#[derive(Clone)]
pub struct IntermediateTxCoordinator {
    store: Arc<dyn IntermediateTxStore>,
}

impl fmt::Debug for IntermediateTxCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntermediateTxCoordinator").finish_non_exhaustive()
    }
}

impl IntermediateTxCoordinator {
    /// Creates a coordinator over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn IntermediateTxStore>) -> Self {
        Self { store }
    }

    /// Stages a just-broadcast first-leg transaction in the pending
    /// bucket. Staging the same id again overwrites the entry
    /// (resubmission with updated gas or nonce).
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence failure.
    pub async fn stage(&self, id: &ActivityId, entry: TxEntry) -> Result<(), ReserveError> {
        self.store.store_pending_tx(id, entry).await?;
        tracing::debug!(%id, "intermediate tx staged");
        Ok(())
    }

    /// Promotes a mined first-leg transaction into the confirmed bucket,
    /// removing it from the pending bucket in the same storage
    /// transaction. Failure leaves state unchanged; retrying with the
    /// same arguments is safe.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] on persistence failure.
    pub async fn promote(&self, id: &ActivityId, entry: TxEntry) -> Result<(), ReserveError> {
        self.store.promote_tx(id, entry).await?;
        tracing::info!(%id, "intermediate tx promoted");
        Ok(())
    }

    /// Fetches the confirmed entry for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::NotFound`] while the transaction has not
    /// been promoted; callers poll and retry later.
    pub async fn confirmed(&self, id: &ActivityId) -> Result<TxEntry, ReserveError> {
        self.store.confirmed_tx(id).await
    }

    /// Checks every pending entry against `observer` and promotes the
    /// ones observed mined. Per-entry failures (chain query or
    /// promotion) are logged and left for the next sweep; they never
    /// abort the rest of the sweep. Returns the number promoted.
    ///
    /// # Errors
    ///
    /// Returns [`ReserveError::Storage`] if the pending bucket itself
    /// cannot be read.
    pub async fn reconcile(&self, observer: &dyn ChainObserver) -> Result<u64, ReserveError> {
        let pending = self.store.pending_txs().await?;
        let mut promoted = 0u64;
        for (id, entry) in pending {
            let mined = match observer.mined(&id, &entry).await {
                Ok(mined) => mined,
                Err(e) => {
                    tracing::warn!(%id, error = %e, "chain confirmation check failed");
                    continue;
                }
            };
            let Some(mined) = mined else {
                continue;
            };
            match self.promote(&id, mined).await {
                Ok(()) => promoted += 1,
                Err(e) => {
                    tracing::warn!(%id, error = %e, "promotion failed, will retry next sweep");
                }
            }
        }
        Ok(promoted)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::storage::MemoryStorage;

    /// Observer that considers a fixed set of hashes mined.
    struct FixedObserver {
        mined_hashes: HashSet<String>,
    }

    #[async_trait]
    impl ChainObserver for FixedObserver {
        async fn mined(
            &self,
            _id: &ActivityId,
            entry: &TxEntry,
        ) -> Result<Option<TxEntry>, ReserveError> {
            if self.mined_hashes.contains(&entry.hash) {
                Ok(Some(entry.clone().mined(entry.timepoint + 100)))
            } else {
                Ok(None)
            }
        }
    }

    /// Observer whose chain queries always fail.
    struct BrokenObserver;

    #[async_trait]
    impl ChainObserver for BrokenObserver {
        async fn mined(
            &self,
            _id: &ActivityId,
            _entry: &TxEntry,
        ) -> Result<Option<TxEntry>, ReserveError> {
            Err(ReserveError::storage("query chain", "node unreachable"))
        }
    }

    fn coordinator() -> (IntermediateTxCoordinator, Arc<MemoryStorage>) {
        let store = Arc::new(MemoryStorage::default());
        let coordinator =
            IntermediateTxCoordinator::new(Arc::clone(&store) as Arc<dyn IntermediateTxStore>);
        (coordinator, store)
    }

    #[tokio::test]
    async fn reconcile_promotes_only_mined_entries() {
        let (coordinator, _store) = coordinator();
        let mined_id = ActivityId::new(500, "dep-1");
        let unmined_id = ActivityId::new(600, "dep-2");
        let staged = coordinator
            .stage(&mined_id, TxEntry::new("0xaaa", "binance", "ETH", 1.0, 500))
            .await;
        assert!(staged.is_ok());
        let staged = coordinator
            .stage(&unmined_id, TxEntry::new("0xbbb", "binance", "KNC", 2.0, 600))
            .await;
        assert!(staged.is_ok());

        let observer = FixedObserver {
            mined_hashes: HashSet::from(["0xaaa".to_string()]),
        };
        let promoted = coordinator.reconcile(&observer).await;
        assert_eq!(promoted.ok(), Some(1));

        let confirmed = coordinator.confirmed(&mined_id).await;
        let Ok(confirmed) = confirmed else {
            panic!("expected promoted entry");
        };
        assert_eq!(confirmed.mining_status, "mined");

        // The unmined entry stays pending and is not yet available.
        assert!(matches!(
            coordinator.confirmed(&unmined_id).await,
            Err(ReserveError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn reconcile_survives_observer_failures() {
        let (coordinator, _store) = coordinator();
        let id = ActivityId::new(500, "dep-1");
        let staged = coordinator
            .stage(&id, TxEntry::new("0xaaa", "binance", "ETH", 1.0, 500))
            .await;
        assert!(staged.is_ok());

        let promoted = coordinator.reconcile(&BrokenObserver).await;
        assert_eq!(promoted.ok(), Some(0));

        // Entry is untouched and picked up by a later sweep.
        let observer = FixedObserver {
            mined_hashes: HashSet::from(["0xaaa".to_string()]),
        };
        let promoted = coordinator.reconcile(&observer).await;
        assert_eq!(promoted.ok(), Some(1));
    }

    #[tokio::test]
    async fn failed_promotion_is_retried_next_sweep() {
        let (coordinator, store) = coordinator();
        let id = ActivityId::new(500, "dep-1");
        let staged = coordinator
            .stage(&id, TxEntry::new("0xaaa", "binance", "ETH", 1.0, 500))
            .await;
        assert!(staged.is_ok());

        let observer = FixedObserver {
            mined_hashes: HashSet::from(["0xaaa".to_string()]),
        };
        store.inject_promotion_failure().await;
        let promoted = coordinator.reconcile(&observer).await;
        assert_eq!(promoted.ok(), Some(0));

        let promoted = coordinator.reconcile(&observer).await;
        assert_eq!(promoted.ok(), Some(1));
        assert!(coordinator.confirmed(&id).await.is_ok());
    }
}
