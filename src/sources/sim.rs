//! Simulated market feed: a random walk with occasional market events.
//!
//! Drives the engine when no live feed is wanted (offline play, tests).
//! Each call to [`SimulatedFeed::tick_all`] advances every symbol one
//! step and records a bar, so conditional orders accumulate history the
//! same way they would against a real feed.

use crate::sources::FeedError;
use crate::types::{OhlcBar, Quote, QuoteMap};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::info;

const DEFAULT_PRICE: f64 = 150.0;
const DEFAULT_VOLATILITY: f64 = 0.02;
const MAX_HISTORY_BARS: usize = 512;

/// A market-wide or single-symbol shock.
#[derive(Debug, Clone)]
pub struct MarketEvent {
    pub name: &'static str,
    /// Multiplier applied to the price
    pub effect: f64,
    /// Per-tick probability
    pub prob: f64,
    /// None hits every symbol
    pub target: Option<&'static str>,
}

fn default_events() -> Vec<MarketEvent> {
    vec![
        MarketEvent {
            name: "Market boom, all stocks rise",
            effect: 1.1,
            prob: 0.02,
            target: None,
        },
        MarketEvent {
            name: "Market crash, all stocks fall",
            effect: 0.9,
            prob: 0.02,
            target: None,
        },
        MarketEvent {
            name: "Tech boost for INFY",
            effect: 1.15,
            prob: 0.03,
            target: Some("INFY"),
        },
        MarketEvent {
            name: "Regulatory issue for RELIANCE",
            effect: 0.85,
            prob: 0.03,
            target: Some("RELIANCE"),
        },
    ]
}

#[derive(Debug)]
struct SimStock {
    price: f64,
    previous_close: f64,
    volatility: f64,
    history: VecDeque<OhlcBar>,
}

struct SimState {
    rng: StdRng,
    stocks: HashMap<String, SimStock>,
}

/// Random-walk price feed.
pub struct SimulatedFeed {
    state: Mutex<SimState>,
    events: Vec<MarketEvent>,
}

impl SimulatedFeed {
    /// Create a feed seeded from the OS RNG.
    pub fn new(symbols: &[String]) -> Self {
        Self::with_seed(symbols, rand::random())
    }

    /// Create a feed with a fixed seed, for reproducible runs.
    pub fn with_seed(symbols: &[String], seed: u64) -> Self {
        let stocks = symbols
            .iter()
            .map(|s| {
                (
                    s.to_uppercase(),
                    SimStock {
                        price: DEFAULT_PRICE,
                        previous_close: DEFAULT_PRICE,
                        volatility: DEFAULT_VOLATILITY,
                        history: VecDeque::new(),
                    },
                )
            })
            .collect();

        Self {
            state: Mutex::new(SimState {
                rng: StdRng::seed_from_u64(seed),
                stocks,
            }),
            events: default_events(),
        }
    }

    /// Advance every symbol one step and return the fresh quote set.
    pub fn tick_all(&self) -> QuoteMap {
        let mut state = self.state.lock().unwrap();
        let SimState { rng, stocks } = &mut *state;
        let now = chrono::Utc::now().timestamp_millis();

        // Roll events once per tick, before the walk
        let mut market_effect = 1.0;
        let mut symbol_effects: HashMap<&str, f64> = HashMap::new();
        for event in &self.events {
            if rng.gen::<f64>() < event.prob {
                info!("Market event: {}", event.name);
                match event.target {
                    None => market_effect *= event.effect,
                    Some(symbol) => {
                        *symbol_effects.entry(symbol).or_insert(1.0) *= event.effect;
                    }
                }
            }
        }

        let mut quotes = QuoteMap::new();
        for (symbol, stock) in stocks.iter_mut() {
            let drift = rng.gen_range(-stock.volatility..stock.volatility);
            let effect = market_effect * symbol_effects.get(symbol.as_str()).copied().unwrap_or(1.0);

            stock.previous_close = stock.price;
            stock.price = (stock.price * (1.0 + drift) * effect).max(0.01);

            let (open, close) = (stock.previous_close, stock.price);
            stock.history.push_back(OhlcBar {
                time: now,
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                volume: rng.gen_range(10_000.0..1_000_000.0),
            });
            while stock.history.len() > MAX_HISTORY_BARS {
                stock.history.pop_front();
            }

            quotes.insert(
                symbol.clone(),
                Quote::new(symbol.clone(), stock.price)
                    .with_previous_close(stock.previous_close),
            );
        }

        quotes
    }

    /// Current quote for one symbol, without advancing the walk.
    pub fn quote(&self, symbol: &str) -> Result<Quote, FeedError> {
        let state = self.state.lock().unwrap();
        let stock = state
            .stocks
            .get(&symbol.to_uppercase())
            .ok_or_else(|| FeedError::Unavailable {
                symbol: symbol.to_string(),
                reason: "symbol not simulated".to_string(),
            })?;
        Ok(Quote::new(symbol.to_uppercase(), stock.price)
            .with_previous_close(stock.previous_close))
    }

    /// Accumulated bars for one symbol, most recent `days` of them.
    pub fn history(&self, symbol: &str, days: usize) -> Result<Vec<OhlcBar>, FeedError> {
        let state = self.state.lock().unwrap();
        let stock = state
            .stocks
            .get(&symbol.to_uppercase())
            .ok_or_else(|| FeedError::Unavailable {
                symbol: symbol.to_string(),
                reason: "symbol not simulated".to_string(),
            })?;
        let skip = stock.history.len().saturating_sub(days);
        Ok(stock.history.iter().skip(skip).cloned().collect())
    }
}
