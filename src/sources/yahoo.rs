//! Yahoo Finance adapter: live quotes and daily OHLC history.
//!
//! Uses the unofficial v8 chart endpoint. One response carries both the
//! regular market price (with previous close) and the historical bars,
//! so quotes and history share a single fetch path.

use crate::sources::FeedError;
use crate::types::{OhlcBar, Quote};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
    chart_previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<u64>>>,
}

/// Yahoo uses hyphens where NSE-style symbols carry dots (BRK-B, M-M).
fn normalize_symbol(symbol: &str) -> String {
    symbol.to_uppercase().replace('.', "-")
}

fn range_for_days(days: usize) -> &'static str {
    match days {
        0..=5 => "5d",
        6..=30 => "1mo",
        31..=90 => "3mo",
        91..=180 => "6mo",
        _ => "1y",
    }
}

/// Yahoo Finance API client.
pub struct YahooFinanceClient {
    client: Client,
}

impl YahooFinanceClient {
    /// Create a new client.
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    async fn fetch_chart(
        &self,
        symbol: &str,
        range: &str,
        interval: &str,
    ) -> Result<ChartResult, FeedError> {
        let unavailable = |reason: String| FeedError::Unavailable {
            symbol: symbol.to_string(),
            reason,
        };

        let url = format!(
            "https://query1.finance.yahoo.com/v8/finance/chart/{}?range={}&interval={}&includePrePost=false",
            normalize_symbol(symbol),
            range,
            interval
        );
        debug!("Fetching Yahoo Finance chart: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP {}", response.status())));
        }

        let envelope: ChartEnvelope = response
            .json()
            .await
            .map_err(|e| unavailable(format!("parse error: {}", e)))?;

        if let Some(error) = envelope.chart.error {
            return Err(unavailable(format!("{}: {}", error.code, error.description)));
        }

        envelope
            .chart
            .result
            .and_then(|mut results| {
                if results.is_empty() {
                    None
                } else {
                    Some(results.remove(0))
                }
            })
            .ok_or_else(|| unavailable("empty result".to_string()))
    }

    /// Fetch a point-in-time quote with the previous session close.
    pub async fn get_quote(&self, symbol: &str) -> Result<Quote, FeedError> {
        let result = self.fetch_chart(symbol, "1d", "1d").await?;

        let price = result.meta.regular_market_price.ok_or(FeedError::Unavailable {
            symbol: symbol.to_string(),
            reason: "no market price in response".to_string(),
        })?;

        let mut quote = Quote::new(symbol, price);
        if let Some(prev) = result
            .meta
            .previous_close
            .or(result.meta.chart_previous_close)
        {
            quote = quote.with_previous_close(prev);
        }
        Ok(quote)
    }

    /// Fetch roughly `days` of daily OHLC bars, oldest first.
    pub async fn get_history(&self, symbol: &str, days: usize) -> Result<Vec<OhlcBar>, FeedError> {
        let result = self
            .fetch_chart(symbol, range_for_days(days), "1d")
            .await?;

        let timestamps = result.timestamp.unwrap_or_default();
        let Some(quote) = result.indicators.quote.into_iter().next() else {
            return Ok(Vec::new());
        };

        let opens = quote.open.unwrap_or_default();
        let highs = quote.high.unwrap_or_default();
        let lows = quote.low.unwrap_or_default();
        let closes = quote.close.unwrap_or_default();
        let volumes = quote.volume.unwrap_or_default();

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &time) in timestamps.iter().enumerate() {
            let close = closes.get(i).and_then(|v| *v).unwrap_or(0.0);
            // Holiday gaps and the forming bar come back as nulls
            if close <= 0.0 {
                continue;
            }
            bars.push(OhlcBar {
                time: time * 1000,
                open: opens.get(i).and_then(|v| *v).unwrap_or(close),
                high: highs.get(i).and_then(|v| *v).unwrap_or(close),
                low: lows.get(i).and_then(|v| *v).unwrap_or(close),
                close,
                volume: volumes.get(i).and_then(|v| *v).unwrap_or(0) as f64,
            });
        }

        Ok(bars)
    }
}

impl Default for YahooFinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_uppercases_and_replaces_dots() {
        assert_eq!(normalize_symbol("infy"), "INFY");
        assert_eq!(normalize_symbol("M.M"), "M-M");
        assert_eq!(normalize_symbol("RELIANCE"), "RELIANCE");
    }

    #[test]
    fn range_scales_with_requested_days() {
        assert_eq!(range_for_days(5), "5d");
        assert_eq!(range_for_days(60), "3mo");
        assert_eq!(range_for_days(400), "1y");
    }

    #[test]
    fn chart_meta_parses_partial_payload() {
        let json = r#"{"regularMarketPrice": 1512.5, "previousClose": 1498.0}"#;
        let meta: ChartMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.regular_market_price, Some(1512.5));
        assert_eq!(meta.previous_close, Some(1498.0));
        assert!(meta.chart_previous_close.is_none());
    }

    #[test]
    fn chart_quote_tolerates_nulls() {
        let json = r#"{"open": [1500.0, null], "close": [1510.0, null]}"#;
        let quote: ChartQuote = serde_json::from_str(json).unwrap();
        let opens = quote.open.unwrap();
        assert_eq!(opens[0], Some(1500.0));
        assert_eq!(opens[1], None);
    }

    #[test]
    fn chart_error_parses() {
        let json = r#"{"result": null, "error": {"code": "Not Found", "description": "No data"}}"#;
        let body: ChartBody = serde_json::from_str(json).unwrap();
        assert!(body.result.is_none());
        assert_eq!(body.error.unwrap().code, "Not Found");
    }
}
