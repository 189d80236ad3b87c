use anyhow::{Context, Result};
use std::path::Path;
use tracing_subscriber::{fmt, EnvFilter};

use ai_paper_trader::config::Config;
use ai_paper_trader::trading::{
    profit_series, Ledger, PerformanceAggregator, PositionTracker, SqliteLedger,
};

fn main() -> Result<()> {
    let cfg = Config::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    // Parse CLI args or use defaults
    let args: Vec<String> = std::env::args().collect();
    let path = args.get(1).cloned().unwrap_or_else(|| cfg.ledger_path.clone());
    let recent_n: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);

    if !Path::new(&path).exists() {
        anyhow::bail!("No ledger at {}", path);
    }
    let ledger = SqliteLedger::open(&path).with_context(|| format!("opening {}", path))?;
    let events = ledger.all().context("reading ledger")?;

    println!("Ledger: {} ({} events)", path, events.len());
    println!("{}", "=".repeat(60));

    match PerformanceAggregator::compute(&events) {
        Ok(report) => {
            let s = report.snapshot;
            if s.total_trades == 0 {
                println!("No completed round-trips.");
            } else {
                println!("Round-trips:   {}", s.total_trades);
                println!("Wins/Losses:   {} / {}", s.wins, report.losses);
                println!("Win rate:      {:.2}%", s.win_rate);
                println!("Total profit:  {:+.4}", s.total_profit);
                println!("Avg win/loss:  {:+.4} / {:+.4}", report.avg_win, report.avg_loss);
                println!("Best/worst:    {:+.4} / {:+.4}", report.best_trade, report.worst_trade);
                if let Some(last) = profit_series(&report.round_trips).last() {
                    println!("Curve end:     {:+.4} at {}", last.cumulative, last.timestamp);
                }
            }

            println!();
            println!("Skipped records: {}", report.skipped);
            for w in &report.warnings {
                println!(
                    "  #{:<5} {} {:<11} {:<10} {}",
                    w.index,
                    w.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    w.action.as_str(),
                    w.symbol,
                    w.reason
                );
            }
        }
        Err(e) => println!("Performance unavailable: {}", e),
    }

    let bad_stamps = ledger
        .unreadable_timestamps()
        .context("scanning timestamps")?;
    if !bad_stamps.is_empty() {
        println!();
        println!("Unreadable timestamps (replayed at the Unix epoch): {}", bad_stamps.len());
        for (id, raw) in &bad_stamps {
            println!("  row {:<5} {:?}", id, raw);
        }
    }

    println!();
    let tracker = PositionTracker::replay(&events);
    let mut any_open = false;
    for p in tracker.open_positions() {
        any_open = true;
        println!(
            "Open: {} {} {} @ {:.2} since {} (SL {}, TP {})",
            p.symbol,
            p.side,
            p.size,
            p.entry_price,
            p.opened_at.format("%Y-%m-%d %H:%M:%S"),
            p.stop_loss.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string()),
            p.take_profit.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
        );
    }
    if !any_open {
        println!("No open positions.");
    }

    println!();
    println!("Most recent {} events:", recent_n);
    for e in ledger.recent(recent_n).context("reading recent events")? {
        println!(
            "  {} {:<10} {:<11} price={} amount={} conf={} {}",
            e.timestamp.format("%Y-%m-%d %H:%M:%S"),
            e.symbol,
            e.action.as_str(),
            e.price,
            e.amount,
            e.confidence,
            e.reason
        );
    }

    Ok(())
}
