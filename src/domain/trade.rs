//! Exchange trade history rows.

use serde::{Deserialize, Serialize};

/// One executed trade as reported by an exchange, stored per trading
/// pair and keyed by `(timestamp, trade_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEntry {
    /// Exchange-assigned trade identifier.
    pub trade_id: String,
    /// Execution price in quote units.
    pub price: f64,
    /// Executed quantity in base units.
    pub qty: f64,
    /// Taker side, `"buy"` or `"sell"`.
    pub side: String,
    /// Execution time in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn serde_round_trip() {
        let trade = TradeEntry {
            trade_id: "t-1".to_string(),
            price: 0.0042,
            qty: 1_000.0,
            side: "buy".to_string(),
            timestamp: 1_000,
        };
        let json = serde_json::to_value(&trade).ok();
        let Some(json) = json else {
            panic!("serialization failed");
        };
        let back: Option<TradeEntry> = serde_json::from_value(json).ok();
        assert_eq!(back, Some(trade));
    }
}
