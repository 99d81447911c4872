//! Activity identity and records.
//!
//! An activity is a single reserve operation (deposit, withdrawal, trade,
//! rate update) tracked from submission to settlement. Records are
//! append-only: an activity is created pending, settled exactly once, and
//! never deleted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Composite identifier for one reserve operation.
///
/// The pair `(timepoint, eid)` is assigned at submission time and is
/// immutable for the activity's lifetime. `timepoint` is a millisecond
/// epoch; `eid` is a free-form exchange or operation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityId {
    /// Submission time in milliseconds since the Unix epoch.
    pub timepoint: u64,
    /// Free-form exchange/operation identifier.
    pub eid: String,
}

impl ActivityId {
    /// Creates a new activity identifier.
    #[must_use]
    pub fn new(timepoint: u64, eid: impl Into<String>) -> Self {
        Self {
            timepoint,
            eid: eid.into(),
        }
    }

    /// Dense, byte-sortable encoding used as the key of the confirmed
    /// intermediate-tx set: 8 big-endian timepoint bytes followed by the
    /// eid, truncated or zero-padded to 56 bytes. Lexicographic order of
    /// the encoding matches `(timepoint, eid)` order, which is what the
    /// confirmed set's ordered seek relies on.
    ///
    /// The pending set uses the JSON encoding instead; the two sets
    /// deliberately key the same logical id differently (exact lookup vs.
    /// ordered seek).
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        let (head, tail) = out.split_at_mut(8);
        head.copy_from_slice(&self.timepoint.to_be_bytes());
        for (dst, src) in tail.iter_mut().zip(self.eid.as_bytes()) {
            *dst = *src;
        }
        out
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.timepoint, self.eid)
    }
}

/// Kind of reserve operation an activity tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    /// Move funds from the reserve to an exchange.
    Deposit,
    /// Move funds from an exchange back to the reserve.
    Withdraw,
    /// Execute a trade on an exchange.
    Trade,
    /// Submit an on-chain rate update.
    SetRate,
}

impl ActivityAction {
    /// Stable string form, matching the persisted JSON representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
            Self::Trade => "trade",
            Self::SetRate => "set_rate",
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied parameters of a reserve operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityParams {
    /// Asset the operation concerns (symbol or asset id).
    pub asset: String,
    /// Operation amount in asset units.
    pub amount: f64,
}

/// Outcome of submitting a reserve operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityResult {
    /// On-chain transaction hash, when the operation produced one.
    #[serde(default)]
    pub tx: String,
    /// Transaction nonce for on-chain operations (rate updates rely on
    /// this for the single-in-flight invariant).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    /// Submission error message, if the operation failed at submit time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One reserve operation's full lifecycle record.
///
/// State machine: `pending -> settled`, terminal. Settlement flips
/// [`ActivityRecord::is_pending`] to `false` exactly once and freezes the
/// result; records are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Composite identifier, immutable once created.
    pub id: ActivityId,
    /// Operation kind.
    pub action: ActivityAction,
    /// Target exchange or on-chain destination.
    pub destination: String,
    /// Caller-supplied parameters.
    pub params: ActivityParams,
    /// Submission/settlement outcome.
    pub result: ActivityResult,
    /// Latest status reported by the exchange feed.
    pub exchange_status: String,
    /// Latest status reported by the chain-confirmation feed.
    pub mining_status: String,
    /// `true` until the operation settles.
    pub is_pending: bool,
    /// Creation time in milliseconds since the Unix epoch.
    pub created: u64,
}

impl ActivityRecord {
    /// Creates a new pending record for a just-submitted operation.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        action: ActivityAction,
        id: ActivityId,
        destination: impl Into<String>,
        params: ActivityParams,
        result: ActivityResult,
        exchange_status: impl Into<String>,
        mining_status: impl Into<String>,
        timepoint: u64,
    ) -> Self {
        Self {
            id,
            action,
            destination: destination.into(),
            params,
            result,
            exchange_status: exchange_status.into(),
            mining_status: mining_status.into(),
            is_pending: true,
            created: timepoint,
        }
    }

    /// Returns a settled copy of this record with the given final result
    /// and statuses.
    #[must_use]
    pub fn settled(
        mut self,
        result: ActivityResult,
        exchange_status: impl Into<String>,
        mining_status: impl Into<String>,
    ) -> Self {
        self.result = result;
        self.exchange_status = exchange_status.into();
        self.mining_status = mining_status.into();
        self.is_pending = false;
        self
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn to_bytes_orders_by_timepoint_then_eid() {
        let a = ActivityId::new(500, "dep-1").to_bytes();
        let b = ActivityId::new(500, "dep-2").to_bytes();
        let c = ActivityId::new(501, "dep-0").to_bytes();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn to_bytes_truncates_long_eids() {
        let id = ActivityId::new(1, "x".repeat(100));
        let bytes = id.to_bytes();
        assert_eq!(bytes.len(), 64);
    }

    #[test]
    fn action_serializes_snake_case() {
        let json = serde_json::to_string(&ActivityAction::SetRate).ok();
        assert_eq!(json.as_deref(), Some("\"set_rate\""));
    }

    #[test]
    fn new_record_starts_pending() {
        let record = ActivityRecord::new(
            ActivityAction::Deposit,
            ActivityId::new(500, "dep-1"),
            "binance",
            ActivityParams {
                asset: "ETH".to_string(),
                amount: 1.5,
            },
            ActivityResult::default(),
            "submitted",
            "",
            500,
        );
        assert!(record.is_pending);
        assert_eq!(record.created, 500);
    }

    #[test]
    fn settled_flips_pending_and_replaces_result() {
        let record = ActivityRecord::new(
            ActivityAction::Withdraw,
            ActivityId::new(900, "wd-1"),
            "huobi",
            ActivityParams {
                asset: "KNC".to_string(),
                amount: 10.0,
            },
            ActivityResult::default(),
            "submitted",
            "",
            900,
        );
        let settled = record.settled(
            ActivityResult {
                tx: "0xabc".to_string(),
                nonce: None,
                error: None,
            },
            "done",
            "mined",
        );
        assert!(!settled.is_pending);
        assert_eq!(settled.result.tx, "0xabc");
        assert_eq!(settled.mining_status, "mined");
    }

    #[test]
    fn record_serde_round_trip() {
        let record = ActivityRecord::new(
            ActivityAction::SetRate,
            ActivityId::new(1_000, "rate-1"),
            "reserve",
            ActivityParams {
                asset: "ALL".to_string(),
                amount: 0.0,
            },
            ActivityResult {
                tx: "0xdef".to_string(),
                nonce: Some(7),
                error: None,
            },
            "",
            "submitted",
            1_000,
        );
        let json = serde_json::to_value(&record).ok();
        let Some(json) = json else {
            panic!("serialization failed");
        };
        assert_eq!(json.get("action").and_then(|v| v.as_str()), Some("set_rate"));
        let back: Option<ActivityRecord> = serde_json::from_value(json).ok();
        assert_eq!(back, Some(record));
    }
}
