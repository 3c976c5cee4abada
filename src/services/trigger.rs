//! Trigger evaluation: pure decision logic for pending orders.
//!
//! [`decide`] inspects one order against one quote and returns what
//! should happen to it. It never mutates the order or touches the
//! ledger, so decisions for different orders on the same tick are
//! independent of evaluation order.

use crate::services::indicators::IndicatorSnapshot;
use crate::types::{Crossing, IndicatorCondition, Order, OrderKind, OrderSide, Quote};

/// Outcome of evaluating one pending order against one quote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Execute at the given price
    Fill(f64),
    /// Resolve the order as cancelled (malformed or unservable)
    Cancel,
    /// Resolve the order as expired (TTL policy)
    Expire,
    /// Leave the order pending
    Hold,
}

/// Decide what happens to `order` given the tick's quote.
///
/// TTL expiry is judged first, from plain `expires_at` data. Trailing
/// stops are checked against the ratcheted mark: the effective mark is
/// `max(stored, quote.price)` so the decision matches what the stored
/// mark becomes after the tick's update.
pub fn decide(
    order: &Order,
    quote: &Quote,
    indicators: Option<&IndicatorSnapshot>,
    now_ms: i64,
) -> Decision {
    if let Some(expires_at) = order.expires_at {
        if now_ms >= expires_at {
            return Decision::Expire;
        }
    }

    match order.kind {
        // Market and percent-sell orders settle at placement and never
        // sit in the book; a pending one is corrupt state.
        OrderKind::Market | OrderKind::PercentSell => Decision::Cancel,

        OrderKind::Limit => {
            let Some(limit) = order.trigger_price else {
                return Decision::Cancel;
            };
            let triggered = match order.side {
                OrderSide::Buy => quote.price <= limit,
                OrderSide::Sell => quote.price >= limit,
            };
            if triggered {
                // Conservative fill at the limit, not the better market price
                Decision::Fill(limit)
            } else {
                Decision::Hold
            }
        }

        OrderKind::StopLossFixed => {
            let Some(stop) = order.trigger_price else {
                return Decision::Cancel;
            };
            if quote.price <= stop {
                Decision::Fill(quote.price)
            } else {
                Decision::Hold
            }
        }

        OrderKind::TrailingStop => {
            let Some(pct) = order.trailing_pct else {
                return Decision::Cancel;
            };
            let mark = order
                .high_water_mark
                .unwrap_or(quote.price)
                .max(quote.price);
            let threshold = mark * (1.0 - pct / 100.0);
            if quote.price <= threshold {
                Decision::Fill(quote.price)
            } else {
                Decision::Hold
            }
        }

        OrderKind::Conditional => {
            let Some(condition) = order.condition else {
                return Decision::Cancel;
            };
            match indicators.and_then(|snap| condition_met(&condition, snap)) {
                Some(true) => Decision::Fill(quote.price),
                // Not crossing, or not enough history yet: wait
                Some(false) | None => Decision::Hold,
            }
        }
    }
}

/// Evaluate a crossover condition against the indicator snapshot.
///
/// Returns None when either operand lacks sufficient history.
fn condition_met(condition: &IndicatorCondition, snapshot: &IndicatorSnapshot) -> Option<bool> {
    let left = snapshot.operand(condition.left)?;
    let right = snapshot.operand(condition.right)?;

    Some(match condition.crossing {
        Crossing::Above => left.prev <= right.prev && left.last > right.last,
        Crossing::Below => left.prev >= right.prev && left.last < right.last,
    })
}
