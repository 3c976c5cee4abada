//! Tests for the order and account types.
//!
//! Covers:
//! - Order constructors and status transitions
//! - Trailing stop mark ratcheting
//! - Ledger operations on accounts
//! - Wire-format stability of the enums

use bourse::types::*;

// =============================================================================
// Account Tests
// =============================================================================

mod account_tests {
    use super::*;

    #[test]
    fn test_account_creation() {
        let account = Account::new("user-1", 100_000.0);

        assert_eq!(account.user_id, "user-1");
        assert_eq!(account.cash_balance, 100_000.0);
        assert!(account.holdings.is_empty());
        assert!(account.created_at > 0);
    }

    #[test]
    fn test_debit_and_credit() {
        let mut account = Account::new("user-1", 1000.0);

        account.debit(400.0).unwrap();
        assert_eq!(account.cash_balance, 600.0);

        account.credit(150.0).unwrap();
        assert_eq!(account.cash_balance, 750.0);
    }

    #[test]
    fn test_debit_insufficient_funds() {
        let mut account = Account::new("user-1", 100.0);

        let err = account.debit(100.01).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(account.cash_balance, 100.0);
    }

    #[test]
    fn test_debit_rejects_negative_amount() {
        let mut account = Account::new("user-1", 100.0);
        assert!(account.debit(-5.0).is_err());
        assert_eq!(account.cash_balance, 100.0);
    }

    #[test]
    fn test_add_shares_new_position() {
        let mut account = Account::new("user-1", 0.0);
        account.add_shares("INFY", 10, 1500.0);

        assert_eq!(account.shares_of("INFY"), 10);
        assert_eq!(account.holdings["INFY"].avg_cost, 1500.0);
    }

    #[test]
    fn test_add_shares_weighted_average() {
        let mut account = Account::new("user-1", 0.0);
        account.add_shares("INFY", 10, 1500.0);
        account.add_shares("INFY", 30, 1700.0);

        let holding = &account.holdings["INFY"];
        assert_eq!(holding.shares, 40);
        // (10*1500 + 30*1700) / 40 = 1650
        assert!((holding.avg_cost - 1650.0).abs() < 1e-9);
    }

    #[test]
    fn test_remove_shares_insufficient() {
        let mut account = Account::new("user-1", 0.0);
        account.add_shares("INFY", 10, 1500.0);

        let err = account.remove_shares("INFY", 15).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientShares {
                symbol: "INFY".to_string(),
                requested: 15,
                available: 10,
            }
        );
        // State unchanged
        assert_eq!(account.shares_of("INFY"), 10);
    }

    #[test]
    fn test_remove_shares_to_zero_drops_entry() {
        let mut account = Account::new("user-1", 0.0);
        account.add_shares("INFY", 10, 1500.0);
        account.remove_shares("INFY", 10).unwrap();

        assert!(!account.holdings.contains_key("INFY"));
        assert_eq!(account.shares_of("INFY"), 0);
    }

    #[test]
    fn test_remove_shares_unknown_symbol() {
        let mut account = Account::new("user-1", 0.0);
        assert!(account.remove_shares("TCS", 1).is_err());
    }
}

// =============================================================================
// Order Tests
// =============================================================================

mod order_tests {
    use super::*;

    #[test]
    fn test_market_order_creation() {
        let order = Order::market("user-1".to_string(), "INFY".to_string(), OrderSide::Buy, 10);

        assert!(!order.id.is_empty());
        assert_eq!(order.user_id, "user-1");
        assert_eq!(order.symbol, "INFY");
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.kind, OrderKind::Market);
        assert_eq!(order.quantity, 10);
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.resolved_at.is_none());
    }

    #[test]
    fn test_limit_order_creation() {
        let order = Order::limit(
            "user-1".to_string(),
            "TCS".to_string(),
            OrderSide::Sell,
            5,
            3500.0,
        );

        assert_eq!(order.kind, OrderKind::Limit);
        assert_eq!(order.trigger_price, Some(3500.0));
    }

    #[test]
    fn test_stop_loss_is_sell_side() {
        let order = Order::stop_loss("user-1".to_string(), "INFY".to_string(), 10, 1400.0);
        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.kind, OrderKind::StopLossFixed);
        assert_eq!(order.trigger_price, Some(1400.0));
    }

    #[test]
    fn test_trailing_stop_initial_mark() {
        let order = Order::trailing_stop("user-1".to_string(), "INFY".to_string(), 10, 5.0, 1500.0);

        assert_eq!(order.high_water_mark, Some(1500.0));
        assert_eq!(order.trailing_pct, Some(5.0));
        // 1500 * 0.95
        assert!((order.trailing_threshold().unwrap() - 1425.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_mark_ratchets_up_never_down() {
        let mut order =
            Order::trailing_stop("user-1".to_string(), "INFY".to_string(), 10, 5.0, 1500.0);

        assert!(order.update_high_water_mark(1600.0));
        assert_eq!(order.high_water_mark, Some(1600.0));

        // Falling prices leave the mark alone
        for price in [1550.0, 1400.0, 900.0] {
            assert!(!order.update_high_water_mark(price));
            assert_eq!(order.high_water_mark, Some(1600.0));
        }

        assert!(order.update_high_water_mark(1601.0));
        assert_eq!(order.high_water_mark, Some(1601.0));
    }

    #[test]
    fn test_mark_monotone_over_random_walk() {
        let mut order =
            Order::trailing_stop("user-1".to_string(), "INFY".to_string(), 10, 5.0, 100.0);
        let prices = [101.0, 99.0, 104.5, 104.4, 90.0, 110.0, 80.0, 80.0, 111.0];

        let mut last_mark = order.high_water_mark.unwrap();
        for price in prices {
            order.update_high_water_mark(price);
            let mark = order.high_water_mark.unwrap();
            assert!(mark >= last_mark, "mark decreased: {} -> {}", last_mark, mark);
            assert!(mark >= price);
            last_mark = mark;
        }
        assert_eq!(last_mark, 111.0);
    }

    #[test]
    fn test_resolve_is_terminal_and_sticky() {
        let mut order = Order::stop_loss("user-1".to_string(), "INFY".to_string(), 10, 1400.0);
        assert!(!order.is_terminal());

        order.resolve(OrderStatus::Filled, Some(1390.0));
        assert!(order.is_terminal());
        assert_eq!(order.fill_price, Some(1390.0));
        assert!(order.resolved_at.is_some());

        // Terminal orders never change again
        order.resolve(OrderStatus::Cancelled, None);
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.fill_price, Some(1390.0));
    }

    #[test]
    fn test_resolve_rejects_pending() {
        let mut order = Order::stop_loss("user-1".to_string(), "INFY".to_string(), 10, 1400.0);
        order.resolve(OrderStatus::Pending, None);
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.resolved_at.is_none());
    }

    #[test]
    fn test_percent_sell_carries_resolved_quantity() {
        let order = Order::percent_sell("user-1".to_string(), "INFY".to_string(), 3, 25.0);
        assert_eq!(order.kind, OrderKind::PercentSell);
        assert_eq!(order.quantity, 3);
        assert_eq!(order.percent, Some(25.0));
    }

    #[test]
    fn test_ttl_stamping() {
        let order = Order::stop_loss("user-1".to_string(), "INFY".to_string(), 10, 1400.0)
            .with_ttl(86_400_000);
        assert_eq!(order.expires_at, Some(order.created_at + 86_400_000));
    }
}

// =============================================================================
// Condition Tests
// =============================================================================

mod condition_tests {
    use super::*;

    #[test]
    fn test_condition_display() {
        let condition = IndicatorCondition {
            left: Operand::Sma(20),
            right: Operand::Sma(50),
            crossing: Crossing::Above,
        };
        assert_eq!(condition.to_string(), "sma(20) crosses above sma(50)");

        let price_cross = IndicatorCondition {
            left: Operand::Price,
            right: Operand::Sma(20),
            crossing: Crossing::Below,
        };
        assert_eq!(price_cross.to_string(), "price crosses below sma(20)");
    }

    #[test]
    fn test_condition_sma_windows() {
        let condition = IndicatorCondition {
            left: Operand::Sma(20),
            right: Operand::Sma(50),
            crossing: Crossing::Above,
        };
        assert_eq!(condition.sma_windows(), vec![20, 50]);

        let price_only = IndicatorCondition {
            left: Operand::Price,
            right: Operand::Sma(20),
            crossing: Crossing::Below,
        };
        assert_eq!(price_only.sma_windows(), vec![20]);
    }
}

// =============================================================================
// Serialization Tests
// =============================================================================

mod serde_tests {
    use super::*;

    #[test]
    fn test_order_kind_wire_format() {
        assert_eq!(
            serde_json::to_string(&OrderKind::Market).unwrap(),
            "\"market\""
        );
        assert_eq!(
            serde_json::to_string(&OrderKind::StopLossFixed).unwrap(),
            "\"stop_loss_fixed\""
        );
        assert_eq!(
            serde_json::to_string(&OrderKind::TrailingStop).unwrap(),
            "\"trailing_stop\""
        );
        assert_eq!(
            serde_json::to_string(&OrderKind::PercentSell).unwrap(),
            "\"percent_sell\""
        );
    }

    #[test]
    fn test_order_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::Filled).unwrap(),
            "\"filled\""
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::Expired).unwrap(),
            "\"expired\""
        );
    }

    #[test]
    fn test_order_round_trips_through_json() {
        let order = Order::trailing_stop("user-1".to_string(), "INFY".to_string(), 10, 5.0, 1500.0);
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, back);
    }

    #[test]
    fn test_conditional_order_round_trips() {
        let order = Order::conditional(
            "user-1".to_string(),
            "INFY".to_string(),
            10,
            IndicatorCondition {
                left: Operand::Sma(20),
                right: Operand::Sma(50),
                crossing: Crossing::Above,
            },
        );
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, back);
    }

    #[test]
    fn test_account_round_trips_through_json() {
        let mut account = Account::new("user-1", 98_765.43);
        account.add_shares("INFY", 10, 1500.25);
        account.add_shares("TCS", 3, 3333.33);

        let json = serde_json::to_string(&account).unwrap();
        let back: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(account, back);
    }
}
