use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::error::LedgerError;
use crate::models::{Confidence, Side, TradeEvent};
use crate::trading::ledger::Ledger;
use crate::trading::position_tracker::{Position, PositionTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitTrigger {
    StopLoss,
    TakeProfit,
}

impl ExitTrigger {
    pub fn reason(&self) -> &'static str {
        match self {
            ExitTrigger::StopLoss => "stop_loss_triggered",
            ExitTrigger::TakeProfit => "take_profit_triggered",
        }
    }
}

impl fmt::Display for ExitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitTrigger::StopLoss => write!(f, "stop"),
            ExitTrigger::TakeProfit => write!(f, "take_profit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExitCheck {
    NotTriggered,
    Triggered {
        trigger: ExitTrigger,
        close: TradeEvent,
    },
}

impl ExitCheck {
    pub fn is_triggered(&self) -> bool {
        matches!(self, ExitCheck::Triggered { .. })
    }
}

/// Closes the open position when the live price crosses its stop-loss or
/// take-profit.
pub struct ExitMonitor {
    symbol: String,
}

impl ExitMonitor {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
        }
    }

    /// Stop-loss wins when both levels are breached.
    pub fn evaluate(position: &Position, price: f64) -> Option<ExitTrigger> {
        let (sl, tp) = (position.stop_loss?, position.take_profit?);
        if !price.is_finite() {
            return None;
        }
        match position.side {
            Side::Long if price <= sl => Some(ExitTrigger::StopLoss),
            Side::Long if price >= tp => Some(ExitTrigger::TakeProfit),
            Side::Short if price >= sl => Some(ExitTrigger::StopLoss),
            Side::Short if price <= tp => Some(ExitTrigger::TakeProfit),
            _ => None,
        }
    }

    /// Appends the closing event on a trigger. Once closed the position is gone
    /// from replay, so calling again before the next open does nothing.
    pub fn check(
        &self,
        ledger: &dyn Ledger,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<ExitCheck, LedgerError> {
        if !price.is_finite() || price <= 0.0 {
            return Ok(ExitCheck::NotTriggered);
        }

        let tracker = PositionTracker::from_ledger(ledger)?;
        let position = match tracker.current(&self.symbol) {
            Some(p) => p,
            None => return Ok(ExitCheck::NotTriggered),
        };

        let trigger = match Self::evaluate(position, price) {
            Some(t) => t,
            None => return Ok(ExitCheck::NotTriggered),
        };

        let close = TradeEvent::new(
            position.side.close_action(),
            &position.symbol,
            &position.timeframe,
            price,
            position.size,
        )
        .at(now)
        .with_levels(position.stop_loss, position.take_profit)
        .with_confidence(Confidence::High)
        .with_reason(trigger.reason());

        ledger.append(close.clone())?;

        info!(
            "{} hit on {} {}: {} @ ${:.2} (entry ${:.2}, PnL ${:+.2})",
            trigger,
            position.side,
            position.symbol,
            close.action,
            price,
            position.entry_price,
            position.unrealized_pnl(price)
        );

        Ok(ExitCheck::Triggered { trigger, close })
    }
}
