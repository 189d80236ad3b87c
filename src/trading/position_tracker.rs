use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StorageError;
use crate::models::{Side, SkipReason, TradeAction, TradeEvent};
use crate::trading::ledger::Ledger;

/// Open paper position derived from ledger replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub timeframe: String,
    pub side: Side,
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    fn from_open(event: &TradeEvent, price: f64, size: f64) -> Self {
        Self {
            symbol: event.symbol.clone(),
            timeframe: event.timeframe.clone(),
            side: event.action.side(),
            entry_price: price,
            size,
            stop_loss: event.stop_loss.numeric(),
            take_profit: event.take_profit.numeric(),
            opened_at: event.timestamp,
        }
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.pnl(self.entry_price, price, self.size)
    }
}

/// One completed open/close (or open/reversal) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTrip {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    /// Closed by an opposite-side open rather than an explicit close.
    pub reversal: bool,
}

impl RoundTrip {
    /// Break-even counts as a win.
    pub fn is_win(&self) -> bool {
        self.pnl >= 0.0
    }
}

/// A stored event left out of replay because its price or amount is unusable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityWarning {
    /// Position in ledger order.
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: TradeAction,
    pub reason: SkipReason,
}

/// Replays ledger events into per-symbol open positions and completed
/// round-trips.
///
/// Per valid event, against the symbol's current position:
/// - open, nothing held: becomes the position
/// - open, same side held: ignored
/// - open, opposite side held: closes the held side at this price, then opens
/// - close matching the held side: closes it
/// - close not matching (or nothing held): ignored
#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    positions: BTreeMap<String, Position>,
    round_trips: Vec<RoundTrip>,
    skipped: Vec<DataQualityWarning>,
    processed: usize,
    seen: usize,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replay(events: &[TradeEvent]) -> Self {
        let mut tracker = Self::new();
        for event in events {
            tracker.apply(event);
        }
        tracker
    }

    pub fn from_ledger(ledger: &dyn Ledger) -> Result<Self, StorageError> {
        Ok(Self::replay(&ledger.all()?))
    }

    /// Feed the next event in ledger order.
    pub fn apply(&mut self, event: &TradeEvent) {
        let index = self.seen;
        self.seen += 1;

        let (price, size) = match event.valid_fill() {
            Ok(fill) => fill,
            Err(reason) => {
                self.skipped.push(DataQualityWarning {
                    index,
                    timestamp: event.timestamp,
                    symbol: event.symbol.clone(),
                    action: event.action,
                    reason,
                });
                return;
            }
        };
        self.processed += 1;

        let side = event.action.side();
        let held = self.positions.get(&event.symbol).map(|p| p.side);

        if event.action.is_open() {
            match held {
                None => {
                    self.positions
                        .insert(event.symbol.clone(), Position::from_open(event, price, size));
                }
                Some(h) if h == side => {}
                Some(_) => {
                    self.close(event, price, true);
                    self.positions
                        .insert(event.symbol.clone(), Position::from_open(event, price, size));
                }
            }
        } else if held == Some(side) {
            self.close(event, price, false);
        }
    }

    fn close(&mut self, event: &TradeEvent, exit_price: f64, reversal: bool) {
        if let Some(pos) = self.positions.remove(&event.symbol) {
            self.round_trips.push(RoundTrip {
                symbol: pos.symbol,
                side: pos.side,
                entry_price: pos.entry_price,
                exit_price,
                size: pos.size,
                pnl: pos.side.pnl(pos.entry_price, exit_price, pos.size),
                opened_at: pos.opened_at,
                closed_at: event.timestamp,
                reversal,
            });
        }
    }

    pub fn current(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn round_trips(&self) -> &[RoundTrip] {
        &self.round_trips
    }

    pub fn skipped(&self) -> &[DataQualityWarning] {
        &self.skipped
    }

    /// Valid events consumed (whether or not they changed state).
    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn into_parts(self) -> (Vec<RoundTrip>, Vec<DataQualityWarning>) {
        (self.round_trips, self.skipped)
    }
}
