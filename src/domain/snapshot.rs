//! Versioned market-data snapshots.
//!
//! A snapshot is an immutable, time-stamped reading of external market or
//! account data (prices, rates, auth data, reference indices), identified
//! by a monotonically increasing integer version. "Version at timestamp T"
//! is defined as the greatest version whose creation time is `<= T` within
//! the queried category.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category a snapshot belongs to. The store is partitioned by category,
/// so versions of different categories never collide.
///
/// Callers pick the category explicitly; the store never inspects the
/// payload to classify it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotCategory {
    /// Exchange order-book price readings.
    Price,
    /// Reserve conversion rates.
    Rate,
    /// Exchange balance/authorization snapshots (retention-managed).
    AuthData,
    /// Gold reference feed.
    Gold,
    /// BTC reference feed.
    Btc,
    /// USD reference feed.
    Usd,
}

impl SnapshotCategory {
    /// Stable string form, matching the persisted column value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Rate => "rate",
            Self::AuthData => "auth_data",
            Self::Gold => "gold",
            Self::Btc => "btc",
            Self::Usd => "usd",
        }
    }
}

impl fmt::Display for SnapshotCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonically increasing snapshot version.
///
/// Assigned by the store in insertion order; greater versions supersede
/// smaller ones within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Wraps a raw version id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw version id.
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stored snapshot row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Store-assigned version.
    pub id: Version,
    /// Reading time in milliseconds since the Unix epoch.
    pub created: u64,
    /// Partition the record belongs to.
    pub category: SnapshotCategory,
    /// Opaque JSON payload; the store never interprets it.
    pub payload: serde_json::Value,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn category_string_forms_are_stable() {
        assert_eq!(SnapshotCategory::Price.as_str(), "price");
        assert_eq!(SnapshotCategory::AuthData.as_str(), "auth_data");
        assert_eq!(SnapshotCategory::Usd.as_str(), "usd");
    }

    #[test]
    fn category_serde_matches_as_str() {
        for category in [
            SnapshotCategory::Price,
            SnapshotCategory::Rate,
            SnapshotCategory::AuthData,
            SnapshotCategory::Gold,
            SnapshotCategory::Btc,
            SnapshotCategory::Usd,
        ] {
            let json = serde_json::to_string(&category).ok();
            assert_eq!(json, Some(format!("\"{}\"", category.as_str())));
        }
    }

    #[test]
    fn versions_order_by_id() {
        assert!(Version::new(1) < Version::new(2));
        assert_eq!(Version::new(5).as_i64(), 5);
    }
}
