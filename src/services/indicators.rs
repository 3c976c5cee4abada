//! Indicator values consumed by conditional orders.
//!
//! Conditional orders compare two operands (price or an SMA window) and
//! need the value of each on the current bar and the one before it to
//! detect a crossing. [`IndicatorSnapshot`] packages exactly that for
//! one symbol.

use crate::types::{OhlcBar, Operand};
use std::collections::HashMap;

/// An operand's value on the previous and current bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub prev: f64,
    pub last: f64,
}

/// Per-symbol indicator values for one evaluation tick.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSnapshot {
    price: Option<SeriesPoint>,
    sma: HashMap<usize, SeriesPoint>,
}

impl IndicatorSnapshot {
    /// Build a snapshot from a daily OHLC series and the live price.
    ///
    /// The current price stands in for the close of the forming bar, so
    /// "previous" for the price operand is the last completed close.
    /// Windows without enough history are simply absent from the
    /// snapshot; the evaluator treats that as "wait for more data".
    pub fn from_history(bars: &[OhlcBar], current_price: f64, windows: &[usize]) -> Self {
        let mut snapshot = Self::default();

        if let Some(last_bar) = bars.last() {
            snapshot.price = Some(SeriesPoint {
                prev: last_bar.close,
                last: current_price,
            });
        }

        for &window in windows {
            let last = sma(bars, window);
            let prev = sma(&bars[..bars.len().saturating_sub(1)], window);
            if let (Some(prev), Some(last)) = (prev, last) {
                snapshot.sma.insert(window, SeriesPoint { prev, last });
            }
        }

        snapshot
    }

    /// Snapshot with explicit values, for tests and synthetic feeds.
    pub fn with_values(price: Option<SeriesPoint>, sma: HashMap<usize, SeriesPoint>) -> Self {
        Self { price, sma }
    }

    /// Look up an operand's series point, if enough history exists.
    pub fn operand(&self, operand: Operand) -> Option<SeriesPoint> {
        match operand {
            Operand::Price => self.price,
            Operand::Sma(window) => self.sma.get(&window).copied(),
        }
    }
}

/// Simple moving average of the last `window` closes, if available.
pub fn sma(bars: &[OhlcBar], window: usize) -> Option<f64> {
    if window == 0 || bars.len() < window {
        return None;
    }
    let sum: f64 = bars.iter().rev().take(window).map(|b| b.close).sum();
    Some(sum / window as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(closes: &[f64]) -> Vec<OhlcBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcBar {
                time: i as i64 * 86_400_000,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn sma_needs_full_window() {
        let series = bars(&[10.0, 20.0, 30.0]);
        assert_eq!(sma(&series, 3), Some(20.0));
        assert_eq!(sma(&series, 4), None);
    }

    #[test]
    fn snapshot_exposes_prev_and_last() {
        let series = bars(&[10.0, 20.0, 30.0, 40.0]);
        let snapshot = IndicatorSnapshot::from_history(&series, 45.0, &[2]);

        let price = snapshot.operand(Operand::Price).unwrap();
        assert_eq!(price.prev, 40.0);
        assert_eq!(price.last, 45.0);

        // last two closes vs the two before the final bar
        let sma2 = snapshot.operand(Operand::Sma(2)).unwrap();
        assert_eq!(sma2.last, 35.0);
        assert_eq!(sma2.prev, 25.0);
    }

    #[test]
    fn snapshot_omits_short_windows() {
        let series = bars(&[10.0, 20.0]);
        let snapshot = IndicatorSnapshot::from_history(&series, 25.0, &[5]);
        assert!(snapshot.operand(Operand::Sma(5)).is_none());
    }
}
