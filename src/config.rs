use std::env;

/// Which market data source drives the evaluation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    /// Live quotes from Yahoo Finance
    Yahoo,
    /// Simulated random-walk market
    Sim,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path.
    pub database_path: String,
    /// Opening balance for new accounts.
    pub starting_balance: f64,
    /// Seconds between evaluation ticks.
    pub tick_interval_secs: u64,
    /// Optional day-order TTL in seconds. Unset means orders never expire.
    pub order_ttl_secs: Option<u64>,
    /// Market data source.
    pub feed: FeedKind,
    /// Symbols tracked for the movers board and the simulated market.
    pub symbols: Vec<String>,
    /// Fixed RNG seed for the simulated feed (reproducible sessions).
    pub sim_seed: Option<u64>,
}

/// NIFTY names tracked by default.
const DEFAULT_SYMBOLS: &[&str] = &[
    "ADANIENT", "AXISBANK", "BHARTIARTL", "HDFCBANK", "ICICIBANK", "INFY", "ITC", "RELIANCE",
    "SBIN", "TCS", "TATAMOTORS", "WIPRO",
];

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let database_path =
            env::var("BOURSE_DB_PATH").unwrap_or_else(|_| "bourse.db".to_string());

        let starting_balance = env::var("BOURSE_STARTING_BALANCE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100_000.0);

        let tick_interval_secs = env::var("BOURSE_TICK_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let order_ttl_secs = env::var("BOURSE_ORDER_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok());

        let feed = match env::var("BOURSE_FEED").as_deref() {
            Ok("sim") => FeedKind::Sim,
            _ => FeedKind::Yahoo,
        };

        let symbols = env::var("BOURSE_SYMBOLS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect());

        let sim_seed = env::var("BOURSE_SIM_SEED")
            .ok()
            .and_then(|v| v.parse().ok());

        Self {
            database_path,
            starting_balance,
            tick_interval_secs,
            order_ttl_secs,
            feed,
            symbols,
            sim_seed,
        }
    }
}
