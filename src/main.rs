mod bot;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use ai_paper_trader::config::Config;
use ai_paper_trader::exchange::{BinanceClient, MarketFeed};
use ai_paper_trader::signals::AiClient;
use ai_paper_trader::trading::SqliteLedger;

use crate::bot::TradingBot;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    for w in &cfg.warnings {
        warn!("{}", w);
    }

    let ledger = SqliteLedger::open(&cfg.ledger_path)
        .with_context(|| format!("opening ledger at {}", cfg.ledger_path))?;
    info!("Ledger ready at {}", cfg.ledger_path);

    let feed = MarketFeed::new(Box::new(BinanceClient::new(&cfg)), &cfg);
    let source = Box::new(AiClient::new(&cfg));
    let shared_config = cfg.shared();

    let mut bot = TradingBot::new(shared_config, feed, source, Arc::new(ledger)).await;
    bot.run().await?;

    Ok(())
}
