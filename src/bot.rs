use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use ai_paper_trader::config::SharedConfig;
use ai_paper_trader::error::CollaboratorError;
use ai_paper_trader::exchange::MarketFeed;
use ai_paper_trader::signals::{decide_with_retry, DecisionContext, SignalHistory, SignalSource};
use ai_paper_trader::trading::{
    AiStatus, DashboardState, ExecutionOutcome, ExitCheck, Ledger, PaperTrader, PerformanceStatus,
};

const AI_RETRY_DELAY: Duration = Duration::from_secs(2);

pub struct TradingBot {
    config: SharedConfig,
    feed: MarketFeed,
    source: Box<dyn SignalSource>,
    trader: PaperTrader,
    history: SignalHistory,
    dashboard: Arc<DashboardState>,
    has_run_once: bool,
}

impl TradingBot {
    pub async fn new(
        config: SharedConfig,
        feed: MarketFeed,
        source: Box<dyn SignalSource>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        let cfg = config.read().await;

        info!("{}", "=".repeat(60));
        info!("AI paper trader starting up");
        info!("Symbol: {} | Timeframe: {}", cfg.symbol, cfg.timeframe);
        info!(
            "Amount: {} | Leverage: {}x | Ledger: {}",
            cfg.trade_amount, cfg.leverage, cfg.ledger_path
        );
        info!(
            "Signal source: {} ({}) | Min confidence: {} | Cooldown: {}m | Confirmation: {}",
            source.name(),
            cfg.ai_model,
            cfg.gate.min_confidence,
            cfg.gate.cooldown_minutes,
            cfg.gate.require_confirmation
        );
        info!("{}", "=".repeat(60));

        let trader = PaperTrader::new(ledger, &cfg);
        let history = SignalHistory::new(cfg.limits.signal_history);
        let dashboard = Arc::new(DashboardState::new(&cfg));

        drop(cfg);

        Self {
            config,
            feed,
            source,
            trader,
            history,
            dashboard,
            has_run_once: false,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        info!("Bot is now running. Press Ctrl+C to stop.");
        self.check_ai().await;
        self.dashboard
            .refresh_from_ledger(self.trader.ledger().as_ref(), Utc::now());
        self.print_status();

        loop {
            let delay = self.next_delay().await;
            if !delay.is_zero() {
                info!("Waiting {}s for the next bar", delay.as_secs());
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    self.shutdown();
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    self.shutdown();
                    return Ok(());
                }
                result = self.tick() => {
                    if let Err(e) = result {
                        error!("Tick failed: {:#}", e);
                    }
                }
            }
            self.has_run_once = true;
        }
    }

    /// First tick runs immediately, then one per bar boundary.
    async fn next_delay(&self) -> Duration {
        if !self.has_run_once {
            return Duration::ZERO;
        }
        let tf = self.config.read().await.timeframe;
        tf.until_next_boundary(Utc::now())
    }

    async fn check_ai(&mut self) {
        let now = Utc::now();
        match self.source.ping().await {
            Ok(()) => {
                info!("{} connection OK", self.source.name());
                self.dashboard.set_ai_status(AiStatus::Connected, None, now);
            }
            Err(CollaboratorError::Disabled(what)) => {
                warn!("{} disabled: {} missing", self.source.name(), what);
                self.dashboard
                    .set_ai_status(AiStatus::Disabled, Some(format!("{} missing", what)), now);
            }
            Err(e) => {
                warn!("{} connection failed: {}", self.source.name(), e);
                self.dashboard
                    .set_ai_status(AiStatus::Error, Some(e.to_string()), now);
            }
        }
    }

    async fn tick(&mut self) -> Result<()> {
        let cfg = self.config.read().await.clone();
        info!("{}", "=".repeat(60));

        let snapshot = match self.feed.snapshot().await {
            Ok(s) => s,
            Err(e) => {
                error!("No market data available, skipping tick: {}", e);
                return Ok(());
            }
        };
        self.dashboard.apply_market(&snapshot);
        info!(
            "{} ${:.2} ({:+.2}%) at {}",
            snapshot.symbol, snapshot.price, snapshot.price_change_pct, snapshot.timestamp
        );

        let now = Utc::now();
        let ledger = self.trader.ledger().clone();

        if snapshot.is_fallback {
            warn!(
                "Market feed down, cached snapshot from {}; no ledger writes this tick",
                snapshot.timestamp
            );
            self.dashboard.refresh_from_ledger(ledger.as_ref(), now);
            return Ok(());
        }

        if let ExitCheck::Triggered { trigger, .. } = self
            .trader
            .check_exits(snapshot.price, now)
            .context("exit check failed")?
        {
            info!("Position closed by {}", trigger);
        }

        let position = self
            .trader
            .current_position()
            .context("reading current position")?;
        let price = snapshot.price;
        let ctx = DecisionContext {
            snapshot,
            last_signal: self.history.last().map(|d| (d.signal, d.confidence)),
            position,
        };

        let outcome = decide_with_retry(
            self.source.as_ref(),
            &ctx,
            Duration::from_secs(cfg.request_timeout_secs),
            cfg.max_retries,
            AI_RETRY_DELAY,
        )
        .await;

        match &outcome.error {
            None => self.dashboard.set_ai_status(AiStatus::Connected, None, now),
            Some(CollaboratorError::Disabled(what)) => {
                self.dashboard
                    .set_ai_status(AiStatus::Disabled, Some(format!("{} missing", what)), now)
            }
            Some(e) => self
                .dashboard
                .set_ai_status(AiStatus::Error, Some(e.to_string()), now),
        }

        let decision = outcome.decision;
        self.dashboard.apply_decision(&decision);
        if !decision.is_fallback {
            self.history.push(decision.clone());
            info!(
                "Signal stats: {} seen {} times in last {}",
                decision.signal,
                self.history.count(decision.signal),
                self.history.len()
            );
            if self.history.streak_of_three() {
                warn!("Three {} signals in a row", decision.signal);
            }
        }

        let result = self
            .trader
            .execute(&decision, price, &self.history.signals(), now)
            .context("executing decision")?;
        match &result {
            ExecutionOutcome::Opened(e) => info!("Recorded {} @ {}", e.action, e.price),
            ExecutionOutcome::Reversed { close, open } => {
                info!("Recorded {} and {} @ {}", close.action, open.action, open.price)
            }
            other => info!("No trade: {:?}", other),
        }

        self.dashboard.refresh_from_ledger(ledger.as_ref(), now);
        self.print_status();
        Ok(())
    }

    fn print_status(&self) {
        let view = self.dashboard.snapshot();
        match &view.performance.status {
            PerformanceStatus::Available => info!(
                "Trades: {} | Wins: {} | Win Rate: {:.1}% | PnL: ${:+.2}",
                view.performance.snapshot.total_trades,
                view.performance.snapshot.wins,
                view.performance.snapshot.win_rate,
                view.performance.snapshot.total_profit
            ),
            PerformanceStatus::Empty => info!("No completed trades yet"),
            PerformanceStatus::Unavailable { reason } => {
                warn!("Performance unavailable: {}", reason)
            }
        }
        if view.performance.skipped > 0 {
            warn!(
                "{} ledger records skipped for data quality",
                view.performance.skipped
            );
        }
        match &view.position {
            Some(p) => info!(
                "Position: {} {} @ ${:.2} | uPnL: {}",
                p.position.side,
                p.position.size,
                p.position.entry_price,
                p.unrealized_pnl
                    .map(|v| format!("${:+.2}", v))
                    .unwrap_or_else(|| "n/a".to_string())
            ),
            None => info!("Position: flat"),
        }
    }

    fn shutdown(&self) {
        info!("Shutting down...");
        self.print_status();
        info!("Bot stopped.");
    }
}
