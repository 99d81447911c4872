//! Intermediate transaction descriptors.
//!
//! A multi-hop deposit first lands on an intermediary account before
//! reaching the exchange. The first-leg transaction is tracked as a
//! [`TxEntry`] with its own pending -> confirmed lifecycle nested inside
//! the parent activity's lifecycle.

use serde::{Deserialize, Serialize};

/// Descriptor of one broadcast first-leg transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxEntry {
    /// Transaction hash as broadcast.
    pub hash: String,
    /// Exchange the deposit is ultimately headed to.
    pub exchange: String,
    /// Asset being deposited.
    pub asset: String,
    /// Deposit amount in asset units.
    pub amount: f64,
    /// Mining status as last observed (`"submitted"`, `"mined"`, ...).
    #[serde(default)]
    pub mining_status: String,
    /// Observation time in milliseconds since the Unix epoch.
    pub timepoint: u64,
}

impl TxEntry {
    /// Creates a just-broadcast entry with the given hash and deposit
    /// details.
    #[must_use]
    pub fn new(
        hash: impl Into<String>,
        exchange: impl Into<String>,
        asset: impl Into<String>,
        amount: f64,
        timepoint: u64,
    ) -> Self {
        Self {
            hash: hash.into(),
            exchange: exchange.into(),
            asset: asset.into(),
            amount,
            mining_status: "submitted".to_string(),
            timepoint,
        }
    }

    /// Returns a copy marked as mined at the given time.
    #[must_use]
    pub fn mined(mut self, timepoint: u64) -> Self {
        self.mining_status = "mined".to_string();
        self.timepoint = timepoint;
        self
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_is_submitted() {
        let entry = TxEntry::new("0xabc", "binance", "ETH", 2.0, 1_000);
        assert_eq!(entry.mining_status, "submitted");
    }

    #[test]
    fn mined_updates_status_and_time() {
        let entry = TxEntry::new("0xabc", "binance", "ETH", 2.0, 1_000).mined(2_000);
        assert_eq!(entry.mining_status, "mined");
        assert_eq!(entry.timepoint, 2_000);
    }
}
