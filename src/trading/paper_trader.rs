use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{LedgerError, StorageError};
use crate::models::{Confidence, Side, Signal, Timeframe, TradeEvent};
use crate::signals::TradeDecision;
use crate::trading::execution_gate::{ExecutionGate, GateDecision, GateRequest, RejectReason};
use crate::trading::exit_monitor::{ExitCheck, ExitMonitor};
use crate::trading::ledger::Ledger;
use crate::trading::position_tracker::{Position, PositionTracker};

/// Default stop/take distance when the decision carries no usable level.
const DEFAULT_LEVEL_PCT: f64 = 0.02;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Rejected(RejectReason),
    /// Same-side signal while already in the position.
    AlreadyHolding(Side),
    /// Opposite-side signal without HIGH confidence.
    HeldReversal(Side),
    InvalidPrice(f64),
    Opened(TradeEvent),
    Reversed { close: TradeEvent, open: TradeEvent },
}

impl ExecutionOutcome {
    pub fn wrote_to_ledger(&self) -> bool {
        matches!(
            self,
            ExecutionOutcome::Opened(_) | ExecutionOutcome::Reversed { .. }
        )
    }
}

/// Paper execution against the ledger. Holds no position state of its own:
/// every call replays the ledger.
pub struct PaperTrader {
    ledger: Arc<dyn Ledger>,
    symbol: String,
    timeframe: Timeframe,
    amount: f64,
    gate: ExecutionGate,
    exits: ExitMonitor,
}

impl PaperTrader {
    pub fn new(ledger: Arc<dyn Ledger>, cfg: &Config) -> Self {
        Self {
            ledger,
            symbol: cfg.symbol.clone(),
            timeframe: cfg.timeframe,
            amount: cfg.trade_amount,
            gate: ExecutionGate::new(cfg.gate.clone()),
            exits: ExitMonitor::new(&cfg.symbol),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn current_position(&self) -> Result<Option<Position>, StorageError> {
        let tracker = PositionTracker::from_ledger(self.ledger.as_ref())?;
        Ok(tracker.current(&self.symbol).cloned())
    }

    pub fn check_exits(&self, price: f64, now: DateTime<Utc>) -> Result<ExitCheck, LedgerError> {
        self.exits.check(self.ledger.as_ref(), price, now)
    }

    /// Gate the decision, then open, reverse or hold.
    pub fn execute(
        &self,
        decision: &TradeDecision,
        price: f64,
        recent_signals: &[Signal],
        now: DateTime<Utc>,
    ) -> Result<ExecutionOutcome, LedgerError> {
        let events = self.ledger.all()?;
        let tracker = PositionTracker::replay(&events);
        let position = tracker.current(&self.symbol);
        let last_open_at = events
            .iter()
            .rev()
            .find(|e| e.action.is_open() && e.symbol == self.symbol)
            .map(|e| e.timestamp);

        let request = GateRequest {
            signal: decision.signal,
            confidence: decision.confidence,
            position: position.map(|p| p.side),
            recent_signals,
            last_open_at,
            now,
        };
        if let GateDecision::Reject(reason) = self.gate.evaluate(&request) {
            info!(
                "Signal {} / {} not executed: {}",
                decision.signal, decision.confidence, reason
            );
            return Ok(ExecutionOutcome::Rejected(reason));
        }

        let side = match decision.signal.side() {
            Some(s) => s,
            None => return Ok(ExecutionOutcome::Rejected(RejectReason::Hold)),
        };

        if !price.is_finite() || price <= 0.0 {
            warn!("Refusing to trade at price {}", price);
            return Ok(ExecutionOutcome::InvalidPrice(price));
        }

        let (stop_loss, take_profit) = levels(side, price, decision);
        let open = TradeEvent::new(side.open_action(), &self.symbol, self.timeframe.as_str(), price, self.amount)
            .at(now)
            .with_levels(stop_loss, take_profit)
            .with_confidence(decision.confidence)
            .with_reason(decision.reason.clone());

        match position {
            None => {
                self.ledger.append(open.clone())?;
                info!(
                    "Opened {} {} {} @ ${:.2} (SL ${:.2}, TP ${:.2})",
                    side, self.amount, self.symbol, price, stop_loss, take_profit
                );
                Ok(ExecutionOutcome::Opened(open))
            }
            Some(p) if p.side == side => {
                info!("Already {} {}, holding", p.side, self.symbol);
                Ok(ExecutionOutcome::AlreadyHolding(p.side))
            }
            Some(p) if decision.confidence < Confidence::High => {
                info!(
                    "Reversal {} -> {} needs HIGH confidence, got {}; keeping position",
                    p.side, side, decision.confidence
                );
                Ok(ExecutionOutcome::HeldReversal(p.side))
            }
            Some(p) => {
                let close = TradeEvent::new(p.side.close_action(), &self.symbol, &p.timeframe, price, p.size)
                    .at(now)
                    .with_levels(stop_loss, take_profit)
                    .with_confidence(Confidence::High)
                    .with_reason("reversal_close");
                self.ledger.append_batch(vec![close.clone(), open.clone()])?;
                info!(
                    "Reversed {} -> {} {} @ ${:.2} (closed PnL ${:+.2})",
                    p.side,
                    side,
                    self.symbol,
                    price,
                    p.unrealized_pnl(price)
                );
                Ok(ExecutionOutcome::Reversed { close, open })
            }
        }
    }
}

/// Decision levels when numeric and positive, else +-2% oriented by side.
fn levels(side: Side, price: f64, decision: &TradeDecision) -> (f64, f64) {
    let usable = |v: Option<f64>| v.filter(|x| x.is_finite() && *x > 0.0);
    let (sl_default, tp_default) = match side {
        Side::Long => (price * (1.0 - DEFAULT_LEVEL_PCT), price * (1.0 + DEFAULT_LEVEL_PCT)),
        Side::Short => (price * (1.0 + DEFAULT_LEVEL_PCT), price * (1.0 - DEFAULT_LEVEL_PCT)),
    };
    (
        usable(decision.stop_loss).unwrap_or(sl_default),
        usable(decision.take_profit).unwrap_or(tp_default),
    )
}
