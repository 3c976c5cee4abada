//! Trading engine
//!
//! Owns the in-memory account and order maps and applies every state
//! transition: order placement, cancellation, and the per-tick
//! evaluation pass that fills pending orders against a quote snapshot.
//!
//! Fills are atomic: the whole post-fill state (cash, shares, order
//! status) is computed on a clone, written to SQLite in one
//! transaction, and only then swapped into the live maps. A failed
//! persist discards the clone, so neither memory nor disk ever shows a
//! half-applied fill.
//!
//! Mutual exclusion is per user, not global: a `Mutex` guards each
//! user's placement/cancellation/evaluation while different users
//! proceed independently.

use crate::services::indicators::IndicatorSnapshot;
use crate::services::sqlite_store::SqliteStore;
use crate::services::trigger::{self, Decision};
use crate::services::valuation;
use crate::types::{
    Account, LeaderboardEntry, LedgerError, Order, OrderKind, OrderSide, OrderStatus,
    PlaceOrderRequest, PortfolioSnapshot, QuoteMap, TopMovers,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Trading engine errors.
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Insufficient funds: need {needed:.2}, have {available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("Insufficient shares of {symbol}: requested {requested}, have {available}")]
    InsufficientShares {
        symbol: String,
        requested: u64,
        available: u64,
    },

    #[error("No quote available for {0}")]
    QuoteUnavailable(String),

    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Order already resolved: {0}")]
    AlreadyResolved(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl From<LedgerError> for TradingError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds { needed, available } => {
                TradingError::InsufficientFunds { needed, available }
            }
            LedgerError::InsufficientShares {
                symbol,
                requested,
                available,
            } => TradingError::InsufficientShares {
                symbol,
                requested,
                available,
            },
            LedgerError::InvalidAmount(amount) => {
                TradingError::InvalidOrder(format!("invalid amount {}", amount))
            }
        }
    }
}

impl From<rusqlite::Error> for TradingError {
    fn from(e: rusqlite::Error) -> Self {
        TradingError::Persistence(e.to_string())
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Opening cash balance for new accounts
    pub starting_balance: f64,
    /// Optional day-order TTL; None means orders never expire
    pub order_ttl_ms: Option<i64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_balance: 100_000.0,
            order_ttl_ms: None,
        }
    }
}

/// A completed fill, as reported to the caller of an evaluation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillEvent {
    pub order_id: String,
    pub user_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: u64,
    pub price: f64,
    pub notional: f64,
    pub timestamp: i64,
}

/// Paper trading engine.
#[derive(Clone)]
pub struct TradingEngine {
    /// Accounts cache (user_id -> Account)
    accounts: Arc<DashMap<String, Account>>,
    /// All orders, pending and resolved (order_id -> Order)
    orders: Arc<DashMap<String, Order>>,
    /// Per-user mutation locks
    user_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    /// SQLite store for persistence
    store: Arc<SqliteStore>,
    config: EngineConfig,
}

impl TradingEngine {
    /// Create a new engine with default configuration.
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    /// Create a new engine with custom configuration.
    pub fn with_config(store: Arc<SqliteStore>, config: EngineConfig) -> Self {
        Self {
            accounts: Arc::new(DashMap::new()),
            orders: Arc::new(DashMap::new()),
            user_locks: Arc::new(DashMap::new()),
            store,
            config,
        }
    }

    /// Load persisted accounts and orders into the caches (call on startup).
    pub fn load_state(&self) {
        let accounts = self.store.load_accounts();
        let orders = self.store.load_orders();
        info!(
            "Loaded {} accounts and {} orders from store",
            accounts.len(),
            orders.len()
        );
        for account in accounts {
            self.accounts.insert(account.user_id.clone(), account);
        }
        for order in orders {
            self.orders.insert(order.id.clone(), order);
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ==========================================================================
    // Accounts
    // ==========================================================================

    /// Fetch an account, creating it with the configured starting
    /// balance on first sight (account-on-first-login).
    pub fn ensure_account(&self, user_id: &str) -> Result<Account, TradingError> {
        if let Some(account) = self.accounts.get(user_id) {
            return Ok(account.clone());
        }
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap();
        // Double check under the lock
        if let Some(account) = self.accounts.get(user_id) {
            return Ok(account.clone());
        }

        let account = Account::new(user_id, self.config.starting_balance);
        self.store.save_account(&account)?;
        self.accounts.insert(account.user_id.clone(), account.clone());
        info!(
            "Created account {} with balance {:.2}",
            user_id, self.config.starting_balance
        );
        Ok(account)
    }

    /// Get an account by user ID.
    pub fn get_account(&self, user_id: &str) -> Option<Account> {
        self.accounts.get(user_id).map(|a| a.clone())
    }

    /// All known accounts.
    pub fn get_all_accounts(&self) -> Vec<Account> {
        self.accounts.iter().map(|e| e.value().clone()).collect()
    }

    /// Reset an account to the starting balance, cancelling its pending
    /// orders and wiping its order history.
    pub fn reset_account(&self, user_id: &str) -> Result<Account, TradingError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap();

        if self.accounts.get(user_id).is_none() {
            return Err(TradingError::AccountNotFound(user_id.to_string()));
        }

        let account = Account::new(user_id, self.config.starting_balance);
        self.store.delete_user_orders(user_id)?;
        self.store.save_account(&account)?;
        self.orders.retain(|_, o| o.user_id != user_id);
        self.accounts.insert(account.user_id.clone(), account.clone());
        info!("Reset account {}", user_id);
        Ok(account)
    }

    // ==========================================================================
    // Order Placement
    // ==========================================================================

    /// Place an order of any kind.
    ///
    /// Market and percent-sell orders settle synchronously against the
    /// supplied quote snapshot and come back already `Filled`; the other
    /// kinds are validated, stamped with the configured TTL, and
    /// inserted `Pending`.
    pub fn place_order(
        &self,
        request: PlaceOrderRequest,
        quotes: &QuoteMap,
    ) -> Result<Order, TradingError> {
        match request.kind {
            OrderKind::Market => {
                let quantity = Self::required_quantity(&request)?;
                let (order, _) = self.place_market(
                    &request.user_id,
                    &request.symbol,
                    request.side,
                    quantity,
                    quotes,
                )?;
                Ok(order)
            }
            OrderKind::PercentSell => {
                let percent = request
                    .percent
                    .ok_or_else(|| TradingError::InvalidOrder("percent is required".into()))?;
                let (order, _) =
                    self.place_percent_sell(&request.user_id, &request.symbol, percent, quotes)?;
                Ok(order)
            }
            _ => self.place_pending(request, quotes),
        }
    }

    /// Execute a market order immediately at the snapshot price.
    pub fn place_market(
        &self,
        user_id: &str,
        symbol: &str,
        side: OrderSide,
        quantity: u64,
        quotes: &QuoteMap,
    ) -> Result<(Order, FillEvent), TradingError> {
        if quantity == 0 {
            return Err(TradingError::InvalidOrder(
                "quantity must be positive".into(),
            ));
        }
        let quote = quotes
            .get(symbol)
            .ok_or_else(|| TradingError::QuoteUnavailable(symbol.to_string()))?;

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap();

        let order = Order::market(
            user_id.to_string(),
            symbol.to_string(),
            side,
            quantity,
        );
        self.settle(order, quote.price)
    }

    /// Sell a percentage of the current position at the market.
    ///
    /// The percentage is applied to the shares held right now and
    /// rounded up, so any percentage above zero sells at least one
    /// share. Resolves instantly; never enters the pending book.
    pub fn place_percent_sell(
        &self,
        user_id: &str,
        symbol: &str,
        percent: f64,
        quotes: &QuoteMap,
    ) -> Result<(Order, FillEvent), TradingError> {
        if !(percent > 0.0 && percent <= 100.0) {
            return Err(TradingError::InvalidOrder(
                "percentage must be in (0, 100]".into(),
            ));
        }
        let quote = quotes
            .get(symbol)
            .ok_or_else(|| TradingError::QuoteUnavailable(symbol.to_string()))?;

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap();

        let account = self
            .accounts
            .get(user_id)
            .map(|a| a.clone())
            .ok_or_else(|| TradingError::AccountNotFound(user_id.to_string()))?;
        let held = account.shares_of(symbol);
        if held == 0 {
            return Err(TradingError::InsufficientShares {
                symbol: symbol.to_string(),
                requested: 0,
                available: 0,
            });
        }
        let quantity = (held as f64 * percent / 100.0).ceil() as u64;
        let quantity = quantity.min(held);

        let order = Order::percent_sell(
            user_id.to_string(),
            symbol.to_string(),
            quantity,
            percent,
        );
        self.settle(order, quote.price)
    }

    /// Validate and insert a standing order (limit, stop, trailing,
    /// conditional).
    fn place_pending(
        &self,
        request: PlaceOrderRequest,
        quotes: &QuoteMap,
    ) -> Result<Order, TradingError> {
        let lock = self.user_lock(&request.user_id);
        let _guard = lock.lock().unwrap();

        let account = self
            .accounts
            .get(&request.user_id)
            .map(|a| a.clone())
            .ok_or_else(|| TradingError::AccountNotFound(request.user_id.clone()))?;

        let quantity = Self::required_quantity(&request)?;
        let quote = quotes.get(&request.symbol);
        let held = account.shares_of(&request.symbol);

        // A symbol nobody quotes and the user does not hold is a typo,
        // not a tradable instrument.
        if quote.is_none() && held == 0 {
            return Err(TradingError::InvalidOrder(format!(
                "unknown symbol {}",
                request.symbol
            )));
        }

        // Sell-side orders may never promise more shares than are held
        // at creation time.
        if request.side == OrderSide::Sell && quantity > held {
            return Err(TradingError::InsufficientShares {
                symbol: request.symbol.clone(),
                requested: quantity,
                available: held,
            });
        }

        let mut order = match request.kind {
            OrderKind::Limit => {
                let limit = Self::required_price(request.trigger_price, "limit price")?;
                if request.side == OrderSide::Buy {
                    let needed = quantity as f64 * limit;
                    if needed > account.cash_balance {
                        return Err(TradingError::InsufficientFunds {
                            needed,
                            available: account.cash_balance,
                        });
                    }
                }
                Order::limit(
                    request.user_id.clone(),
                    request.symbol.clone(),
                    request.side,
                    quantity,
                    limit,
                )
            }
            OrderKind::StopLossFixed => {
                if request.side == OrderSide::Buy {
                    return Err(TradingError::InvalidOrder(
                        "stop-loss orders are sell-side".into(),
                    ));
                }
                let stop = Self::required_price(request.trigger_price, "stop price")?;
                Order::stop_loss(request.user_id.clone(), request.symbol.clone(), quantity, stop)
            }
            OrderKind::TrailingStop => {
                if request.side == OrderSide::Buy {
                    return Err(TradingError::InvalidOrder(
                        "trailing stops are sell-side".into(),
                    ));
                }
                let pct = request.trailing_pct.ok_or_else(|| {
                    TradingError::InvalidOrder("trailing percentage is required".into())
                })?;
                if !(pct > 0.0 && pct < 100.0) {
                    return Err(TradingError::InvalidOrder(
                        "trailing percentage must be in (0, 100)".into(),
                    ));
                }
                // The mark starts from a live quote; without one the
                // order has no meaningful reference price.
                let quote = quote
                    .ok_or_else(|| TradingError::QuoteUnavailable(request.symbol.clone()))?;
                Order::trailing_stop(
                    request.user_id.clone(),
                    request.symbol.clone(),
                    quantity,
                    pct,
                    quote.price,
                )
            }
            OrderKind::Conditional => {
                if request.side == OrderSide::Buy {
                    return Err(TradingError::InvalidOrder(
                        "conditional orders are sell-side".into(),
                    ));
                }
                let condition = request.condition.ok_or_else(|| {
                    TradingError::InvalidOrder("indicator condition is required".into())
                })?;
                Order::conditional(
                    request.user_id.clone(),
                    request.symbol.clone(),
                    quantity,
                    condition,
                )
            }
            OrderKind::Market | OrderKind::PercentSell => {
                unreachable!("handled by place_order")
            }
        };

        if let Some(ttl) = self.config.order_ttl_ms {
            order = order.with_ttl(ttl);
        }

        self.store.save_order(&order)?;
        self.orders.insert(order.id.clone(), order.clone());
        info!(
            "Placed {} {} order {} for {} x{}",
            order.side, order.kind, order.id, order.symbol, order.quantity
        );
        Ok(order)
    }

    fn required_quantity(request: &PlaceOrderRequest) -> Result<u64, TradingError> {
        match request.quantity {
            Some(q) if q > 0 => Ok(q),
            _ => Err(TradingError::InvalidOrder(
                "quantity must be positive".into(),
            )),
        }
    }

    fn required_price(price: Option<f64>, what: &str) -> Result<f64, TradingError> {
        match price {
            Some(p) if p > 0.0 && p.is_finite() => Ok(p),
            _ => Err(TradingError::InvalidOrder(format!(
                "{} must be positive",
                what
            ))),
        }
    }

    // ==========================================================================
    // Cancellation
    // ==========================================================================

    /// Cancel a pending order owned by `user_id`.
    ///
    /// An order that already resolved (for example filled by a
    /// concurrent evaluation pass) reports `AlreadyResolved` so the
    /// caller can tell "too late" from "never existed".
    pub fn cancel_order(&self, order_id: &str, user_id: &str) -> Result<Order, TradingError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap();

        let mut order = self
            .orders
            .get(order_id)
            .filter(|o| o.user_id == user_id)
            .map(|o| o.clone())
            .ok_or_else(|| TradingError::NotFound(order_id.to_string()))?;

        if order.is_terminal() {
            return Err(TradingError::AlreadyResolved(order_id.to_string()));
        }

        order.resolve(OrderStatus::Cancelled, None);
        self.store.save_order(&order)?;
        self.orders.insert(order.id.clone(), order.clone());
        info!("Cancelled order {}", order_id);
        Ok(order)
    }

    // ==========================================================================
    // Evaluation
    // ==========================================================================

    /// Evaluate every pending order against one quote snapshot.
    ///
    /// Orders are processed FIFO by creation time. Decisions come from
    /// the snapshot alone, never from ledger state mutated earlier in
    /// the same pass, so evaluating unrelated orders in either order
    /// yields the same decisions. A symbol with no quote this tick is
    /// skipped and survives to the next pass.
    pub fn evaluate_all(
        &self,
        quotes: &QuoteMap,
        indicators: &HashMap<String, IndicatorSnapshot>,
    ) -> Vec<FillEvent> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut fills = Vec::new();

        let mut pending: Vec<Order> = self
            .orders
            .iter()
            .filter(|e| !e.value().is_terminal())
            .map(|e| e.value().clone())
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        for stale in pending {
            let Some(quote) = quotes.get(&stale.symbol) else {
                // Feed failure is non-fatal; the order waits for the
                // next tick.
                debug!("No quote for {}, order {} skipped", stale.symbol, stale.id);
                continue;
            };

            let lock = self.user_lock(&stale.user_id);
            let _guard = lock.lock().unwrap();

            // Re-read under the lock; a cancel may have won the race.
            let Some(mut order) = self.orders.get(&stale.id).map(|o| o.clone()) else {
                continue;
            };
            if order.is_terminal() {
                continue;
            }

            // The trailing mark ratchets on every tick, fill or not.
            let ratcheted = order.update_high_water_mark(quote.price);

            let decision = trigger::decide(
                &order,
                quote,
                indicators.get(&order.symbol),
                now_ms,
            );

            match decision {
                Decision::Hold => {
                    if ratcheted {
                        if let Err(e) = self.store.save_order(&order) {
                            warn!("Failed to persist trailing mark for {}: {}", order.id, e);
                        } else {
                            self.orders.insert(order.id.clone(), order);
                        }
                    }
                }
                Decision::Expire => {
                    order.resolve(OrderStatus::Expired, None);
                    if let Err(e) = self.store.save_order(&order) {
                        warn!("Failed to persist expiry of {}: {}", order.id, e);
                    } else {
                        info!("Order {} expired", order.id);
                        self.orders.insert(order.id.clone(), order);
                    }
                }
                Decision::Cancel => {
                    order.resolve(OrderStatus::Cancelled, None);
                    if let Err(e) = self.store.save_order(&order) {
                        warn!("Failed to persist cancellation of {}: {}", order.id, e);
                    } else {
                        warn!("Order {} cancelled during evaluation", order.id);
                        self.orders.insert(order.id.clone(), order);
                    }
                }
                Decision::Fill(price) => match self.fill_order(order, price) {
                    Ok(event) => fills.push(event),
                    Err(e) => warn!("Fill failed: {}", e),
                },
            }
        }

        fills
    }

    /// Settle a fresh order immediately (market and percent-sell path).
    /// Caller holds the user lock.
    fn settle(&self, mut order: Order, price: f64) -> Result<(Order, FillEvent), TradingError> {
        let event = self.apply_fill(&mut order, price)?;
        Ok((order, event))
    }

    /// Fill a pending order from the evaluation pass. Caller holds the
    /// user lock. A business-rule failure (funds or shares gone since
    /// placement) resolves the order as cancelled instead of leaving a
    /// corrupt ledger.
    fn fill_order(&self, mut order: Order, price: f64) -> Result<FillEvent, TradingError> {
        match self.apply_fill(&mut order, price) {
            Ok(event) => Ok(event),
            Err(
                err @ (TradingError::InsufficientFunds { .. }
                | TradingError::InsufficientShares { .. }
                | TradingError::AccountNotFound(_)),
            ) => {
                warn!(
                    "Order {} can no longer settle ({}), cancelling",
                    order.id, err
                );
                order.resolve(OrderStatus::Cancelled, None);
                if let Err(e) = self.store.save_order(&order) {
                    warn!("Failed to persist cancellation of {}: {}", order.id, e);
                } else {
                    self.orders.insert(order.id.clone(), order);
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Apply one fill as a single transaction: ledger mutations and the
    /// order transition are computed on clones, persisted together, and
    /// committed to the caches only after the write succeeds.
    fn apply_fill(&self, order: &mut Order, price: f64) -> Result<FillEvent, TradingError> {
        let mut account = self
            .accounts
            .get(&order.user_id)
            .map(|a| a.clone())
            .ok_or_else(|| TradingError::AccountNotFound(order.user_id.clone()))?;

        let notional = order.quantity as f64 * price;
        match order.side {
            OrderSide::Buy => {
                account.debit(notional)?;
                account.add_shares(&order.symbol, order.quantity, price);
            }
            OrderSide::Sell => {
                account.remove_shares(&order.symbol, order.quantity)?;
                account.credit(notional)?;
            }
        }
        order.resolve(OrderStatus::Filled, Some(price));

        // One transaction for the whole fill; on failure the clones are
        // dropped and the live state is untouched.
        self.store.save_user_state(&account, &[&*order])?;

        self.accounts.insert(account.user_id.clone(), account);
        self.orders.insert(order.id.clone(), order.clone());

        let event = FillEvent {
            order_id: order.id.clone(),
            user_id: order.user_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            kind: order.kind,
            quantity: order.quantity,
            price,
            notional,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        info!(
            "Filled {} {} x{} {} at {:.2}",
            event.side, event.symbol, event.quantity, event.kind, price
        );
        Ok(event)
    }

    // ==========================================================================
    // Queries
    // ==========================================================================

    /// Get an order by ID.
    pub fn get_order(&self, order_id: &str) -> Option<Order> {
        self.orders.get(order_id).map(|o| o.clone())
    }

    /// Pending orders for one user, oldest first.
    pub fn pending_orders(&self, user_id: &str) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|e| e.value().user_id == user_id && !e.value().is_terminal())
            .map(|e| e.value().clone())
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        orders
    }

    /// Resolved orders for one user, newest first (audit history).
    pub fn order_history(&self, user_id: &str) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|e| e.value().user_id == user_id && e.value().is_terminal())
            .map(|e| e.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        orders
    }

    /// Portfolio valuation for one user at the given quotes.
    pub fn portfolio(
        &self,
        user_id: &str,
        quotes: &QuoteMap,
    ) -> Result<PortfolioSnapshot, TradingError> {
        let account = self
            .get_account(user_id)
            .ok_or_else(|| TradingError::AccountNotFound(user_id.to_string()))?;
        Ok(valuation::snapshot(&account, quotes))
    }

    /// Net-worth leaderboard over all accounts.
    pub fn leaderboard(&self, quotes: &QuoteMap) -> Vec<LeaderboardEntry> {
        valuation::rank(&self.get_all_accounts(), quotes)
    }

    /// Top gainers and losers for the day.
    pub fn top_movers(&self, quotes: &QuoteMap, n: usize) -> TopMovers {
        valuation::top_movers(quotes, n)
    }

    /// Every symbol the engine currently cares about: held positions
    /// plus symbols with pending orders.
    pub fn active_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .accounts
            .iter()
            .flat_map(|e| e.value().holdings.keys().cloned().collect::<Vec<_>>())
            .chain(
                self.orders
                    .iter()
                    .filter(|e| !e.value().is_terminal())
                    .map(|e| e.value().symbol.clone()),
            )
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// SMA windows needed per symbol to evaluate the pending
    /// conditional orders this tick.
    pub fn conditional_windows(&self) -> HashMap<String, Vec<usize>> {
        let mut by_symbol: HashMap<String, Vec<usize>> = HashMap::new();
        for entry in self.orders.iter() {
            let order = entry.value();
            if order.is_terminal() || order.kind != OrderKind::Conditional {
                continue;
            }
            if let Some(condition) = &order.condition {
                let windows = by_symbol.entry(order.symbol.clone()).or_default();
                for window in condition.sma_windows() {
                    if !windows.contains(&window) {
                        windows.push(window);
                    }
                }
            }
        }
        for windows in by_symbol.values_mut() {
            windows.sort_unstable();
        }
        by_symbol
    }
}
