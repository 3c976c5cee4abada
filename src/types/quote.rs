//! Market data types shared by the feed adapters and the trading engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A point-in-time price observation for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Symbol being quoted (e.g., "INFY", "RELIANCE")
    pub symbol: String,
    /// Last traded price
    pub price: f64,
    /// Previous session close, when the source provides it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<f64>,
    /// Observation timestamp (ms)
    pub timestamp: i64,
}

impl Quote {
    /// Create a quote stamped with the current time.
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            previous_close: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Attach the previous session close.
    pub fn with_previous_close(mut self, previous_close: f64) -> Self {
        self.previous_close = Some(previous_close);
        self
    }

    /// Percentage change from previous close, if known.
    pub fn change_pct(&self) -> Option<f64> {
        let prev = self.previous_close?;
        if prev <= 0.0 {
            return None;
        }
        Some((self.price - prev) / prev * 100.0)
    }
}

/// The quote snapshot one evaluation tick runs against, keyed by symbol.
pub type QuoteMap = HashMap<String, Quote>;

/// One OHLC bar of a historical series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    /// Bar open time (ms)
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A symbol's standing in the daily movers ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoverEntry {
    pub symbol: String,
    pub price: f64,
    /// Change from previous close, percent
    pub change_pct: f64,
}

/// Top gainers and losers for the day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopMovers {
    pub gainers: Vec<MoverEntry>,
    pub losers: Vec<MoverEntry>,
}
