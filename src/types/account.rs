//! Account and holdings: the ledger side of the paper trading engine.
//!
//! All cash and share movement goes through the four ledger operations
//! below. Validation happens before any field is touched, so a failed
//! operation leaves the account exactly as it was.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Ledger operation errors.
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient funds: need {needed:.2}, have {available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("Insufficient shares of {symbol}: requested {requested}, have {available}")]
    InsufficientShares {
        symbol: String,
        requested: u64,
        available: u64,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),
}

/// A single position in an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    /// Shares held (whole shares only)
    pub shares: u64,
    /// Weighted average cost per share
    pub avg_cost: f64,
}

/// A user's trading account: cash plus holdings.
///
/// Holdings use a BTreeMap so iteration and serialized form are
/// deterministic, which keeps persisted snapshots stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Unique user ID
    pub user_id: String,
    /// Cash balance, never negative after a committed operation
    pub cash_balance: f64,
    /// Holdings by symbol; zero-share entries are removed
    #[serde(default)]
    pub holdings: BTreeMap<String, Holding>,
    /// When the account was created (ms)
    pub created_at: i64,
    /// When the account was last mutated (ms)
    pub updated_at: i64,
}

impl Account {
    /// Create a new account with the given opening balance.
    pub fn new(user_id: impl Into<String>, starting_balance: f64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            user_id: user_id.into(),
            cash_balance: starting_balance,
            holdings: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Shares currently held in `symbol`, zero if none.
    pub fn shares_of(&self, symbol: &str) -> u64 {
        self.holdings.get(symbol).map(|h| h.shares).unwrap_or(0)
    }

    /// Remove `amount` from the cash balance.
    pub fn debit(&mut self, amount: f64) -> Result<(), LedgerError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if amount > self.cash_balance {
            return Err(LedgerError::InsufficientFunds {
                needed: amount,
                available: self.cash_balance,
            });
        }
        self.cash_balance -= amount;
        self.touch();
        Ok(())
    }

    /// Add `amount` to the cash balance.
    pub fn credit(&mut self, amount: f64) -> Result<(), LedgerError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.cash_balance += amount;
        self.touch();
        Ok(())
    }

    /// Add `qty` shares of `symbol` bought at `price`, folding the new
    /// lot into the weighted average cost.
    pub fn add_shares(&mut self, symbol: &str, qty: u64, price: f64) {
        if qty == 0 {
            return;
        }
        match self.holdings.get_mut(symbol) {
            Some(holding) => {
                let prior = holding.shares as f64;
                let added = qty as f64;
                holding.avg_cost = (prior * holding.avg_cost + added * price) / (prior + added);
                holding.shares += qty;
            }
            None => {
                self.holdings.insert(
                    symbol.to_string(),
                    Holding {
                        shares: qty,
                        avg_cost: price,
                    },
                );
            }
        }
        self.touch();
    }

    /// Remove `qty` shares of `symbol`. The average cost of the
    /// remainder is unchanged; the entry is dropped at zero shares.
    pub fn remove_shares(&mut self, symbol: &str, qty: u64) -> Result<(), LedgerError> {
        let available = self.shares_of(symbol);
        if qty > available {
            return Err(LedgerError::InsufficientShares {
                symbol: symbol.to_string(),
                requested: qty,
                available,
            });
        }
        if qty == 0 {
            return Ok(());
        }
        if let Some(holding) = self.holdings.get_mut(symbol) {
            holding.shares -= qty;
            if holding.shares == 0 {
                self.holdings.remove(symbol);
            }
            self.touch();
        }
        Ok(())
    }

    /// Book value of all holdings (shares at average cost).
    pub fn holdings_cost_basis(&self) -> f64 {
        self.holdings
            .values()
            .map(|h| h.shares as f64 * h.avg_cost)
            .sum()
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_rejects_overdraft_without_mutation() {
        let mut account = Account::new("user-1", 100.0);
        let err = account.debit(150.0).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                needed: 150.0,
                available: 100.0
            }
        );
        assert_eq!(account.cash_balance, 100.0);
    }

    #[test]
    fn add_shares_weights_average_cost() {
        let mut account = Account::new("user-1", 0.0);
        account.add_shares("INFY", 10, 100.0);
        account.add_shares("INFY", 10, 200.0);

        let holding = &account.holdings["INFY"];
        assert_eq!(holding.shares, 20);
        assert!((holding.avg_cost - 150.0).abs() < 1e-9);
    }

    #[test]
    fn remove_shares_drops_empty_entry() {
        let mut account = Account::new("user-1", 0.0);
        account.add_shares("INFY", 5, 100.0);
        account.remove_shares("INFY", 5).unwrap();
        assert!(account.holdings.is_empty());
    }

    #[test]
    fn remove_shares_keeps_avg_cost_for_remainder() {
        let mut account = Account::new("user-1", 0.0);
        account.add_shares("TCS", 10, 3000.0);
        account.remove_shares("TCS", 4).unwrap();

        let holding = &account.holdings["TCS"];
        assert_eq!(holding.shares, 6);
        assert_eq!(holding.avg_cost, 3000.0);
    }
}
