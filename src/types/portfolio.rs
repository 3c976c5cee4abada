//! Derived portfolio views: valuation snapshots and leaderboard entries.
//!
//! Nothing here is stored. Snapshots are recomputed from the account and
//! the current quote set on demand.

use serde::{Deserialize, Serialize};

/// Mark-to-market view of a single holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionValue {
    pub symbol: String,
    pub shares: u64,
    pub avg_cost: f64,
    /// Price used for valuation. Falls back to avg_cost when no quote
    /// was available this tick.
    pub last_price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_pct: f64,
    /// False when the valuation price is a fallback, not a live quote
    pub priced: bool,
}

/// Point-in-time portfolio valuation for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    pub user_id: String,
    pub cash_balance: f64,
    pub positions: Vec<PositionValue>,
    /// Cash plus mark-to-market value of all holdings
    pub net_worth: f64,
    /// Symbols that had no usable quote this tick
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// When the snapshot was computed (ms)
    pub timestamp: i64,
}

/// One row of the net-worth leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based rank
    pub rank: u32,
    pub user_id: String,
    pub net_worth: f64,
}
