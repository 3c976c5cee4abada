//! Portfolio valuation: net worth, leaderboard ranking, top movers.
//!
//! Valuation is read-only over accounts plus a quote snapshot. A missing
//! quote degrades only the affected position (flagged in the snapshot's
//! warnings), never the whole computation.

use crate::types::{
    Account, LeaderboardEntry, MoverEntry, PortfolioSnapshot, PositionValue, QuoteMap, TopMovers,
};
use tracing::debug;

/// Mark-to-market net worth: cash plus holdings at current quotes.
///
/// Holdings without a quote are valued at their average cost.
pub fn net_worth(account: &Account, quotes: &QuoteMap) -> f64 {
    snapshot(account, quotes).net_worth
}

/// Full valuation snapshot for one account.
pub fn snapshot(account: &Account, quotes: &QuoteMap) -> PortfolioSnapshot {
    let mut positions = Vec::with_capacity(account.holdings.len());
    let mut warnings = Vec::new();
    let mut holdings_value = 0.0;

    for (symbol, holding) in &account.holdings {
        let live = quotes.get(symbol.as_str()).map(|q| q.price);
        if live.is_none() {
            debug!("No quote for held symbol {}, valuing at cost", symbol);
            warnings.push(symbol.clone());
        }
        let last_price = live.unwrap_or(holding.avg_cost);
        let market_value = holding.shares as f64 * last_price;
        let unrealized_pnl = (last_price - holding.avg_cost) * holding.shares as f64;
        let unrealized_pnl_pct = if holding.avg_cost > 0.0 {
            (last_price - holding.avg_cost) / holding.avg_cost * 100.0
        } else {
            0.0
        };
        holdings_value += market_value;

        positions.push(PositionValue {
            symbol: symbol.clone(),
            shares: holding.shares,
            avg_cost: holding.avg_cost,
            last_price,
            market_value,
            unrealized_pnl,
            unrealized_pnl_pct,
            priced: live.is_some(),
        });
    }

    PortfolioSnapshot {
        user_id: account.user_id.clone(),
        cash_balance: account.cash_balance,
        positions,
        net_worth: account.cash_balance + holdings_value,
        warnings,
        timestamp: chrono::Utc::now().timestamp_millis(),
    }
}

/// Rank accounts by descending net worth; ties break by user id
/// ascending so the ordering is deterministic.
pub fn rank(accounts: &[Account], quotes: &QuoteMap) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<(String, f64)> = accounts
        .iter()
        .map(|a| (a.user_id.clone(), net_worth(a, quotes)))
        .collect();

    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    entries
        .into_iter()
        .enumerate()
        .map(|(i, (user_id, net_worth))| LeaderboardEntry {
            rank: i as u32 + 1,
            user_id,
            net_worth,
        })
        .collect()
}

/// Top `n` gainers and losers by percentage change from previous close.
///
/// Symbols missing either the current price or the previous close are
/// excluded rather than counted as unchanged.
pub fn top_movers(quotes: &QuoteMap, n: usize) -> TopMovers {
    let mut movers: Vec<MoverEntry> = quotes
        .values()
        .filter_map(|quote| {
            let change_pct = quote.change_pct()?;
            Some(MoverEntry {
                symbol: quote.symbol.clone(),
                price: quote.price,
                change_pct,
            })
        })
        .collect();

    movers.sort_by(|a, b| {
        b.change_pct
            .partial_cmp(&a.change_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    let gainers: Vec<MoverEntry> = movers.iter().take(n).cloned().collect();
    let losers: Vec<MoverEntry> = movers.iter().rev().take(n).cloned().collect();

    TopMovers { gainers, losers }
}
