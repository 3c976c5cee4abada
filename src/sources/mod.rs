//! Price feed adapters.
//!
//! The engine never fetches prices itself; a feed is polled by the
//! scheduler in `main.rs` and the resulting quote snapshot is handed to
//! `evaluate_all`. Feed failures are transient by contract: an order
//! whose symbol cannot be quoted this tick simply waits.

pub mod sim;
pub mod yahoo;

pub use sim::SimulatedFeed;
pub use yahoo::YahooFinanceClient;

use crate::types::{OhlcBar, Quote, QuoteMap};
use thiserror::Error;
use tracing::warn;

/// Feed errors. Always transient from the engine's point of view.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Quote unavailable for {symbol}: {reason}")]
    Unavailable { symbol: String, reason: String },
}

/// A configured market data source.
pub enum MarketFeed {
    Yahoo(YahooFinanceClient),
    Sim(SimulatedFeed),
}

impl MarketFeed {
    /// Fetch one quote.
    pub async fn get_quote(&self, symbol: &str) -> Result<Quote, FeedError> {
        match self {
            MarketFeed::Yahoo(client) => client.get_quote(symbol).await,
            MarketFeed::Sim(feed) => feed.quote(symbol),
        }
    }

    /// Fetch a quote snapshot for one tick. Symbols that fail are
    /// logged and left out; the caller treats absence as "skip".
    pub async fn get_quotes(&self, symbols: &[String]) -> QuoteMap {
        match self {
            MarketFeed::Yahoo(client) => {
                let mut quotes = QuoteMap::new();
                for symbol in symbols {
                    match client.get_quote(symbol).await {
                        Ok(quote) => {
                            quotes.insert(quote.symbol.clone(), quote);
                        }
                        Err(e) => warn!("{}", e),
                    }
                }
                quotes
            }
            MarketFeed::Sim(feed) => feed.tick_all(),
        }
    }

    /// Fetch roughly `days` of daily bars for a symbol.
    pub async fn get_history(&self, symbol: &str, days: usize) -> Result<Vec<OhlcBar>, FeedError> {
        match self {
            MarketFeed::Yahoo(client) => client.get_history(symbol, days).await,
            MarketFeed::Sim(feed) => feed.history(symbol, days),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim_feed() -> MarketFeed {
        MarketFeed::Sim(SimulatedFeed::with_seed(
            &["INFY".to_string(), "TCS".to_string()],
            9,
        ))
    }

    #[test]
    fn sim_feed_quotes_every_requested_symbol() {
        let feed = sim_feed();
        let quotes = tokio_test::block_on(
            feed.get_quotes(&["INFY".to_string(), "TCS".to_string()]),
        );
        assert_eq!(quotes.len(), 2);
        assert!(quotes["INFY"].previous_close.is_some());
    }

    #[test]
    fn sim_feed_history_grows_with_ticks() {
        let feed = sim_feed();
        for _ in 0..3 {
            tokio_test::block_on(feed.get_quotes(&["INFY".to_string()]));
        }
        let bars = tokio_test::block_on(feed.get_history("INFY", 30)).unwrap();
        assert_eq!(bars.len(), 3);
    }

    #[test]
    fn sim_feed_reports_unknown_symbols() {
        let feed = sim_feed();
        let err = tokio_test::block_on(feed.get_quote("WIPRO")).unwrap_err();
        assert!(matches!(err, FeedError::Unavailable { .. }));
    }
}
