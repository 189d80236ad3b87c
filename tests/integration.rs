mod common;

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use ai_paper_trader::config::Config;
use ai_paper_trader::exchange::{DataSource, MarketFeed};
use ai_paper_trader::models::{Confidence, RawNumber, Side, Signal, TradeAction};
use ai_paper_trader::signals::{decide_with_retry, DecisionContext, SignalHistory};
use ai_paper_trader::trading::{
    DashboardState, ExecutionOutcome, ExitCheck, Ledger, PaperTrader, PerformanceAggregator,
    PerformanceStatus, RejectReason, SqliteLedger,
};

use common::{bars_ending_at, base_time, test_config, MockExchange, ScriptedSource};

/// One bot tick, wired the way the binary wires it.
struct Harness {
    feed: MarketFeed,
    source: ScriptedSource,
    trader: PaperTrader,
    history: SignalHistory,
    dashboard: DashboardState,
    ledger: Arc<SqliteLedger>,
    cfg: Config,
}

impl Harness {
    fn new(cfg: Config, market: MockExchange, source: ScriptedSource) -> Self {
        let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
        Self {
            feed: MarketFeed::new(Box::new(market), &cfg).with_retry_delay(StdDuration::ZERO),
            source,
            trader: PaperTrader::new(ledger.clone(), &cfg),
            history: SignalHistory::new(cfg.limits.signal_history),
            dashboard: DashboardState::new(&cfg),
            ledger,
            cfg,
        }
    }

    async fn tick(&mut self, now: DateTime<Utc>) -> Option<ExecutionOutcome> {
        let snapshot = self.feed.snapshot().await.ok()?;
        self.dashboard.apply_market(&snapshot);
        if snapshot.is_fallback {
            self.dashboard.refresh_from_ledger(self.ledger.as_ref(), now);
            return None;
        }

        self.trader.check_exits(snapshot.price, now).unwrap();
        let price = snapshot.price;
        let ctx = DecisionContext {
            snapshot,
            last_signal: self.history.last().map(|d| (d.signal, d.confidence)),
            position: self.trader.current_position().unwrap(),
        };
        let out = decide_with_retry(
            &self.source,
            &ctx,
            StdDuration::from_secs(self.cfg.request_timeout_secs),
            self.cfg.max_retries,
            StdDuration::ZERO,
        )
        .await;
        self.dashboard.apply_decision(&out.decision);
        if !out.decision.is_fallback {
            self.history.push(out.decision.clone());
        }

        let result = self
            .trader
            .execute(&out.decision, price, &self.history.signals(), now)
            .unwrap();
        self.dashboard.refresh_from_ledger(self.ledger.as_ref(), now);
        Some(result)
    }
}

fn at(minutes: i64) -> DateTime<Utc> {
    base_time() + Duration::minutes(minutes)
}

#[tokio::test]
async fn open_then_stop_loss_round_trip() {
    let market = MockExchange::new(vec![Some(bars_ending_at(100.0)), Some(bars_ending_at(97.0))]);
    let source = ScriptedSource::new(vec![
        (Signal::Buy, Confidence::High),
        (Signal::Hold, Confidence::Medium),
    ]);
    let mut h = Harness::new(test_config(), market, source);

    match h.tick(at(0)).await {
        Some(ExecutionOutcome::Opened(e)) => {
            assert_eq!(e.action, TradeAction::OpenLong);
            assert_eq!(e.stop_loss, RawNumber::Number(98.0));
        }
        other => panic!("expected open, got {:?}", other),
    }
    let view = h.dashboard.snapshot();
    assert_eq!(view.performance.status, PerformanceStatus::Empty);
    assert_eq!(view.position.as_ref().unwrap().position.side, Side::Long);

    let second = h.tick(at(15)).await;
    assert_eq!(second, Some(ExecutionOutcome::Rejected(RejectReason::Hold)));

    let events = h.ledger.all().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].action, TradeAction::CloseLong);
    assert_eq!(events[1].reason, "stop_loss_triggered");

    let view = h.dashboard.snapshot();
    assert_eq!(view.performance.status, PerformanceStatus::Available);
    assert_eq!(view.performance.snapshot.total_trades, 1);
    assert_eq!(view.performance.snapshot.wins, 0);
    assert_eq!(view.performance.snapshot.total_profit, -3.0);
    assert!(view.position.is_none());
    assert_eq!(view.profit_curve.last().unwrap().cumulative, -3.0);
    assert_eq!(view.ai_decisions.len(), 2);
}

#[tokio::test]
async fn reversal_needs_high_confidence_and_is_atomic() {
    let market = MockExchange::new(vec![
        Some(bars_ending_at(100.0)),
        Some(bars_ending_at(101.0)),
        Some(bars_ending_at(101.0)),
    ]);
    let source = ScriptedSource::new(vec![
        (Signal::Buy, Confidence::High),
        (Signal::Sell, Confidence::Medium),
        (Signal::Sell, Confidence::High),
    ]);
    let mut h = Harness::new(test_config(), market, source);

    assert!(matches!(h.tick(at(0)).await, Some(ExecutionOutcome::Opened(_))));
    assert_eq!(
        h.tick(at(15)).await,
        Some(ExecutionOutcome::HeldReversal(Side::Long))
    );
    assert!(matches!(
        h.tick(at(30)).await,
        Some(ExecutionOutcome::Reversed { .. })
    ));

    let actions: Vec<TradeAction> = h.ledger.all().unwrap().iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![TradeAction::OpenLong, TradeAction::CloseLong, TradeAction::OpenShort]
    );

    let report = PerformanceAggregator::from_ledger(h.ledger.as_ref()).unwrap();
    assert_eq!(report.snapshot.total_trades, 1);
    assert_eq!(report.snapshot.total_profit, 1.0);
    assert_eq!(h.trader.current_position().unwrap().unwrap().side, Side::Short);
}

#[tokio::test]
async fn first_entry_waits_for_confirmation() {
    let mut cfg = test_config();
    cfg.gate.require_confirmation = true;
    let market = MockExchange::new(vec![Some(bars_ending_at(100.0)), Some(bars_ending_at(100.5))]);
    let source = ScriptedSource::new(vec![
        (Signal::Buy, Confidence::High),
        (Signal::Buy, Confidence::High),
    ]);
    let mut h = Harness::new(cfg, market, source);

    assert_eq!(
        h.tick(at(0)).await,
        Some(ExecutionOutcome::Rejected(RejectReason::Unconfirmed))
    );
    assert!(matches!(h.tick(at(15)).await, Some(ExecutionOutcome::Opened(_))));
}

#[tokio::test]
async fn outages_degrade_without_touching_the_ledger() {
    let market = MockExchange::new(vec![Some(bars_ending_at(100.0)), None, None]);
    let source = ScriptedSource::new(vec![]);
    let mut h = Harness::new(test_config(), market, source);

    // Source down: explicit HOLD fallback, nothing written.
    assert_eq!(
        h.tick(at(0)).await,
        Some(ExecutionOutcome::Rejected(RejectReason::Hold))
    );
    let view = h.dashboard.snapshot();
    assert!(view.ai_decisions[0].is_fallback);
    assert_eq!(view.ai_decisions[0].signal, Signal::Hold);
    assert_eq!(view.ai_decisions[0].confidence, Confidence::Low);
    assert_eq!(view.performance.status, PerformanceStatus::Empty);

    // Feed down: cached snapshot flagged, still nothing written.
    assert_eq!(h.tick(at(15)).await, None);
    let view = h.dashboard.snapshot();
    assert!(view.is_fallback);
    assert_eq!(view.data_source, Some(DataSource::Cached));
    assert_eq!(view.price, Some(100.0));
    assert!(h.ledger.all().unwrap().is_empty());
}

#[test]
fn legacy_file_with_bad_rows_is_reported_not_hidden() {
    let dir = std::env::temp_dir().join(format!("ledger_it_{}", std::process::id()));
    let path = dir.join("legacy.db");
    let _ = std::fs::remove_file(&path);

    drop(SqliteLedger::open(&path).unwrap());
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "INSERT INTO trades (timestamp, symbol, timeframe, signal, action, amount, price, confidence, reason) VALUES
             ('2024-01-15 12:00:00', 'BTCUSDT', '15m', 'BUY',  'open_long',  1, 100.0, 'HIGH', ''),
             ('2024-01-15 12:15:00', 'BTCUSDT', '15m', 'SELL', 'close_long', 1, NULL,  'HIGH', ''),
             ('2024-01-15 12:30:00', 'BTCUSDT', '15m', 'SELL', 'close_long', 1, 'abc', 'HIGH', ''),
             ('2024-01-15 12:45:00', 'BTCUSDT', '15m', 'SELL', 'close_long', 0, 105.0, 'HIGH', ''),
             ('2024-01-15 13:00:00', 'BTCUSDT', '15m', 'SELL', 'close_long', 1, 110.0, 'HIGH', '');",
        )
        .unwrap();
    }

    let ledger = SqliteLedger::open(&path).unwrap();
    let report = PerformanceAggregator::from_ledger(&ledger).unwrap();
    assert_eq!(report.snapshot.total_trades, 1);
    assert_eq!(report.snapshot.wins, 1);
    assert_eq!(report.snapshot.win_rate, 100.0);
    assert_eq!(report.snapshot.total_profit, 10.0);
    assert_eq!(report.skipped, 3);
    assert_eq!(
        report.warnings.iter().map(|w| w.index).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    let trader = PaperTrader::new(Arc::new(ledger), &test_config());
    assert!(trader.current_position().unwrap().is_none());
    assert_eq!(
        trader.check_exits(50.0, Utc::now()).unwrap(),
        ExitCheck::NotTriggered
    );

    let _ = std::fs::remove_file(&path);
}
