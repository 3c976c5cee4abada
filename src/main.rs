use bourse::config::{Config, FeedKind};
use bourse::services::{EngineConfig, IndicatorSnapshot, SqliteStore, TradingEngine};
use bourse::sources::{MarketFeed, SimulatedFeed, YahooFinanceClient};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Enough daily bars for the widest common SMA window plus slack.
const HISTORY_DAYS: usize = 90;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bourse=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    info!(
        "Starting bourse (feed: {:?}, tick every {}s)",
        config.feed, config.tick_interval_secs
    );

    let store = Arc::new(SqliteStore::new(&config.database_path)?);
    let engine = TradingEngine::with_config(
        store,
        EngineConfig {
            starting_balance: config.starting_balance,
            order_ttl_ms: config.order_ttl_secs.map(|s| s as i64 * 1000),
        },
    );
    engine.load_state();

    let feed = match config.feed {
        FeedKind::Yahoo => MarketFeed::Yahoo(YahooFinanceClient::new()),
        FeedKind::Sim => MarketFeed::Sim(match config.sim_seed {
            Some(seed) => SimulatedFeed::with_seed(&config.symbols, seed),
            None => SimulatedFeed::new(&config.symbols),
        }),
    };

    let mut interval = tokio::time::interval(Duration::from_secs(config.tick_interval_secs.max(1)));
    loop {
        interval.tick().await;
        run_tick(&engine, &feed, &config.symbols).await;
    }
}

/// One evaluation pass: fresh quotes, indicator snapshots for the
/// conditional orders, then the engine tick.
async fn run_tick(engine: &TradingEngine, feed: &MarketFeed, tracked: &[String]) {
    // Quote everything we track plus everything users hold or have
    // orders against.
    let mut symbols = engine.active_symbols();
    for symbol in tracked {
        if !symbols.contains(symbol) {
            symbols.push(symbol.clone());
        }
    }

    let quotes = feed.get_quotes(&symbols).await;
    if quotes.is_empty() {
        warn!("No quotes this tick, skipping evaluation");
        return;
    }

    let mut indicators = HashMap::new();
    for (symbol, windows) in engine.conditional_windows() {
        let Some(quote) = quotes.get(&symbol) else {
            continue;
        };
        match feed.get_history(&symbol, HISTORY_DAYS).await {
            Ok(bars) => {
                indicators.insert(
                    symbol.clone(),
                    IndicatorSnapshot::from_history(&bars, quote.price, &windows),
                );
            }
            Err(e) => debug!("No history for {} this tick: {}", symbol, e),
        }
    }

    let fills = engine.evaluate_all(&quotes, &indicators);
    for fill in &fills {
        info!(
            "Fill: {} {} {} x{} at {:.2} (order {})",
            fill.user_id, fill.side, fill.symbol, fill.quantity, fill.price, fill.order_id
        );
    }
    if !fills.is_empty() {
        debug!("{} orders filled this tick", fills.len());
    }
}
