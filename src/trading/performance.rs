use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AggregationError;
use crate::models::TradeEvent;
use crate::trading::ledger::Ledger;
use crate::trading::position_tracker::{DataQualityWarning, PositionTracker, RoundTrip};

/// Win rate and realized profit, always derived by replaying the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub total_trades: usize,
    pub wins: usize,
    /// Percent, 0 when there are no completed trades.
    pub win_rate: f64,
    pub total_profit: f64,
}

impl PerformanceSnapshot {
    /// Zero trades, zero win rate, zero profit.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub snapshot: PerformanceSnapshot,
    pub losses: usize,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub skipped: usize,
    pub warnings: Vec<DataQualityWarning>,
    pub round_trips: Vec<RoundTrip>,
}

impl PerformanceReport {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitPoint {
    pub timestamp: DateTime<Utc>,
    pub pnl: f64,
    pub cumulative: f64,
}

pub struct PerformanceAggregator;

impl PerformanceAggregator {
    /// Pure over `events`: same input, same report.
    pub fn compute(events: &[TradeEvent]) -> Result<PerformanceReport, AggregationError> {
        let tracker = PositionTracker::replay(events);
        let (round_trips, warnings) = tracker.into_parts();

        for w in &warnings {
            warn!(
                "Skipping ledger record #{} ({} {} @ {}): {}",
                w.index, w.action, w.symbol, w.timestamp, w.reason
            );
        }

        let mut total_profit = 0.0;
        let mut wins = 0;
        let mut win_sum = 0.0;
        let mut loss_sum = 0.0;
        let mut best = f64::NEG_INFINITY;
        let mut worst = f64::INFINITY;

        for (i, trip) in round_trips.iter().enumerate() {
            total_profit += trip.pnl;
            if !total_profit.is_finite() {
                return Err(AggregationError::NonFinite(i + 1));
            }
            if trip.is_win() {
                wins += 1;
                win_sum += trip.pnl;
            } else {
                loss_sum += trip.pnl;
            }
            best = best.max(trip.pnl);
            worst = worst.min(trip.pnl);
        }

        let total_trades = round_trips.len();
        let losses = total_trades - wins;
        let win_rate = if total_trades > 0 {
            wins as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        Ok(PerformanceReport {
            snapshot: PerformanceSnapshot {
                total_trades,
                wins,
                win_rate,
                total_profit,
            },
            losses,
            avg_win: if wins > 0 { win_sum / wins as f64 } else { 0.0 },
            avg_loss: if losses > 0 { loss_sum / losses as f64 } else { 0.0 },
            best_trade: if total_trades > 0 { best } else { 0.0 },
            worst_trade: if total_trades > 0 { worst } else { 0.0 },
            skipped: warnings.len(),
            warnings,
            round_trips,
        })
    }

    pub fn from_ledger(ledger: &dyn Ledger) -> Result<PerformanceReport, AggregationError> {
        let events = ledger.all()?;
        Self::compute(&events)
    }
}

/// Cumulative realized P&L at each round-trip close, oldest first.
pub fn profit_series(round_trips: &[RoundTrip]) -> Vec<ProfitPoint> {
    let mut cumulative = 0.0;
    round_trips
        .iter()
        .map(|t| {
            cumulative += t.pnl;
            ProfitPoint {
                timestamp: t.closed_at,
                pnl: t.pnl,
                cumulative,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PerformanceStatus {
    /// Derived from at least one completed round-trip.
    Available,
    /// Ledger read fine but holds no completed round-trips.
    Empty,
    /// Could not be computed; the snapshot is the empty one.
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceView {
    pub status: PerformanceStatus,
    pub snapshot: PerformanceSnapshot,
    pub skipped: usize,
}

impl PerformanceView {
    pub fn from_result(result: &Result<PerformanceReport, AggregationError>) -> Self {
        match result {
            Ok(report) => Self {
                status: if report.snapshot.total_trades > 0 {
                    PerformanceStatus::Available
                } else {
                    PerformanceStatus::Empty
                },
                snapshot: report.snapshot,
                skipped: report.skipped,
            },
            Err(e) => Self::unavailable(e.to_string()),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            status: PerformanceStatus::Unavailable {
                reason: reason.into(),
            },
            snapshot: PerformanceSnapshot::empty(),
            skipped: 0,
        }
    }
}
