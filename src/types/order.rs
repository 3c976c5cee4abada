//! Order types for the paper trading engine.
//!
//! Every order variant is a case of the closed [`OrderKind`] enum, so the
//! trigger evaluator can match exhaustively. An order is mutable only
//! while `Pending`; once resolved it is retained unchanged for audit.

use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Order variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Execute immediately at the current quote
    Market,
    /// Execute at the target price or better
    Limit,
    /// Sell a percentage of the position, settled immediately
    PercentSell,
    /// Sell when price drops to a fixed threshold
    StopLossFixed,
    /// Stop whose threshold ratchets up with the best price seen
    TrailingStop,
    /// Sell when an indicator condition is met
    Conditional,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Market => write!(f, "market"),
            OrderKind::Limit => write!(f, "limit"),
            OrderKind::PercentSell => write!(f, "percent_sell"),
            OrderKind::StopLossFixed => write!(f, "stop_loss_fixed"),
            OrderKind::TrailingStop => write!(f, "trailing_stop"),
            OrderKind::Conditional => write!(f, "conditional"),
        }
    }
}

/// Order status. Transitions only Pending -> {Filled, Cancelled, Expired}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Expired,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Filled => write!(f, "filled"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
            OrderStatus::Expired => write!(f, "expired"),
        }
    }
}

// =============================================================================
// Indicator Conditions
// =============================================================================

/// One side of an indicator comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// The quote price itself
    Price,
    /// Simple moving average over the given window of daily closes
    Sma(usize),
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Price => write!(f, "price"),
            Operand::Sma(window) => write!(f, "sma({})", window),
        }
    }
}

/// Crossing direction for a conditional order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crossing {
    Above,
    Below,
}

/// An indicator crossover condition: `left` crosses above/below `right`.
///
/// Covers both "price crosses below SMA(20)" and "SMA(20) crosses above
/// SMA(50)" without hard-coding a single indicator pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorCondition {
    pub left: Operand,
    pub right: Operand,
    pub crossing: Crossing,
}

impl IndicatorCondition {
    /// SMA windows this condition needs from the indicator snapshot.
    pub fn sma_windows(&self) -> Vec<usize> {
        let mut windows = Vec::new();
        for operand in [self.left, self.right] {
            if let Operand::Sma(window) = operand {
                windows.push(window);
            }
        }
        windows
    }
}

impl std::fmt::Display for IndicatorCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self.crossing {
            Crossing::Above => "crosses above",
            Crossing::Below => "crosses below",
        };
        write!(f, "{} {} {}", self.left, verb, self.right)
    }
}

// =============================================================================
// Order
// =============================================================================

/// A trading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Unique order ID
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Symbol being traded
    pub symbol: String,
    /// Buy or sell
    pub side: OrderSide,
    /// Order variant
    pub kind: OrderKind,
    /// Shares to trade. For percent sells this is the resolved share
    /// count, computed at placement.
    pub quantity: u64,
    /// Percentage of the position (percent sells only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    /// Target/threshold price; meaning depends on kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<f64>,
    /// Trail distance in percent (trailing stops only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailing_pct: Option<f64>,
    /// Best price seen since placement (trailing stops only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_water_mark: Option<f64>,
    /// Indicator condition (conditional orders only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<IndicatorCondition>,
    /// Current status
    pub status: OrderStatus,
    /// Price the order filled at, once filled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_price: Option<f64>,
    /// When the order was created (ms)
    pub created_at: i64,
    /// When the order reached a terminal status (ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
    /// TTL deadline, when a day-order policy is configured (ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Order {
    fn base(
        user_id: String,
        symbol: String,
        side: OrderSide,
        kind: OrderKind,
        quantity: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            symbol,
            side,
            kind,
            quantity,
            percent: None,
            trigger_price: None,
            trailing_pct: None,
            high_water_mark: None,
            condition: None,
            status: OrderStatus::Pending,
            fill_price: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            resolved_at: None,
            expires_at: None,
        }
    }

    /// Create a market order.
    pub fn market(user_id: String, symbol: String, side: OrderSide, quantity: u64) -> Self {
        Self::base(user_id, symbol, side, OrderKind::Market, quantity)
    }

    /// Create a limit order at `trigger_price`.
    pub fn limit(
        user_id: String,
        symbol: String,
        side: OrderSide,
        quantity: u64,
        trigger_price: f64,
    ) -> Self {
        let mut order = Self::base(user_id, symbol, side, OrderKind::Limit, quantity);
        order.trigger_price = Some(trigger_price);
        order
    }

    /// Create a fixed stop-loss sell at `trigger_price`.
    pub fn stop_loss(user_id: String, symbol: String, quantity: u64, trigger_price: f64) -> Self {
        let mut order = Self::base(
            user_id,
            symbol,
            OrderSide::Sell,
            OrderKind::StopLossFixed,
            quantity,
        );
        order.trigger_price = Some(trigger_price);
        order
    }

    /// Create a trailing stop sell. The high-water mark starts at the
    /// quote price observed at creation time.
    pub fn trailing_stop(
        user_id: String,
        symbol: String,
        quantity: u64,
        trailing_pct: f64,
        initial_price: f64,
    ) -> Self {
        let mut order = Self::base(
            user_id,
            symbol,
            OrderSide::Sell,
            OrderKind::TrailingStop,
            quantity,
        );
        order.trailing_pct = Some(trailing_pct);
        order.high_water_mark = Some(initial_price);
        order.trigger_price = Some(initial_price * (1.0 - trailing_pct / 100.0));
        order
    }

    /// Create a conditional sell tied to an indicator crossover.
    pub fn conditional(
        user_id: String,
        symbol: String,
        quantity: u64,
        condition: IndicatorCondition,
    ) -> Self {
        let mut order = Self::base(
            user_id,
            symbol,
            OrderSide::Sell,
            OrderKind::Conditional,
            quantity,
        );
        order.condition = Some(condition);
        order
    }

    /// Create a percent sell. `quantity` is the share count already
    /// resolved from the percentage at placement time.
    pub fn percent_sell(user_id: String, symbol: String, quantity: u64, percent: f64) -> Self {
        let mut order = Self::base(
            user_id,
            symbol,
            OrderSide::Sell,
            OrderKind::PercentSell,
            quantity,
        );
        order.percent = Some(percent);
        order
    }

    /// Check if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status != OrderStatus::Pending
    }

    /// Transition to a terminal status. No-op if already resolved.
    pub fn resolve(&mut self, status: OrderStatus, fill_price: Option<f64>) {
        if self.is_terminal() || status == OrderStatus::Pending {
            return;
        }
        self.status = status;
        self.fill_price = fill_price;
        self.resolved_at = Some(chrono::Utc::now().timestamp_millis());
    }

    /// Ratchet the trailing-stop high-water mark upward. The mark never
    /// decreases, even on ticks where the price falls.
    ///
    /// Returns true if the mark moved.
    pub fn update_high_water_mark(&mut self, current_price: f64) -> bool {
        if self.kind != OrderKind::TrailingStop {
            return false;
        }
        let mark = self.high_water_mark.unwrap_or(current_price);
        if current_price > mark {
            self.high_water_mark = Some(current_price);
            if let Some(pct) = self.trailing_pct {
                self.trigger_price = Some(current_price * (1.0 - pct / 100.0));
            }
            return true;
        }
        if self.high_water_mark.is_none() {
            self.high_water_mark = Some(mark);
            return true;
        }
        false
    }

    /// Current trailing-stop threshold: mark scaled down by the trail
    /// percentage.
    pub fn trailing_threshold(&self) -> Option<f64> {
        let mark = self.high_water_mark?;
        let pct = self.trailing_pct?;
        Some(mark * (1.0 - pct / 100.0))
    }

    /// Stamp a TTL deadline relative to creation.
    pub fn with_ttl(mut self, ttl_ms: i64) -> Self {
        self.expires_at = Some(self.created_at + ttl_ms);
        self
    }
}

/// Request payload for placing an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub user_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,
    /// Percentage of the position, percent sells only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailing_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<IndicatorCondition>,
}
