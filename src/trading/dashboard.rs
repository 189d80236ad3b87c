use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::config::Config;
use crate::exchange::{DataSource, MarketSnapshot};
use crate::models::TradeEvent;
use crate::signals::TradeDecision;
use crate::trading::ledger::Ledger;
use crate::trading::performance::{profit_series, PerformanceAggregator, PerformanceView, ProfitPoint};
use crate::trading::position_tracker::{Position, PositionTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiStatus {
    Unknown,
    Connected,
    Error,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiModelInfo {
    pub provider: String,
    pub model: String,
    pub status: AiStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    #[serde(flatten)]
    pub position: Position,
    /// Against the last market price; `None` before any quote.
    pub unrealized_pnl: Option<f64>,
}

/// Read-only copy handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    pub symbol: String,
    pub timeframe: String,
    pub price: Option<f64>,
    pub price_change_pct: f64,
    pub price_time: Option<DateTime<Utc>>,
    pub is_fallback: bool,
    pub data_source: Option<DataSource>,
    pub position: Option<PositionView>,
    pub performance: PerformanceView,
    /// Newest first.
    pub recent_trades: Vec<TradeEvent>,
    /// Oldest first.
    pub ai_decisions: Vec<TradeDecision>,
    pub profit_curve: Vec<ProfitPoint>,
    pub ai_model: AiModelInfo,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Inner {
    market: Option<MarketSnapshot>,
    position: Option<Position>,
    performance: PerformanceView,
    recent_trades: Vec<TradeEvent>,
    ai_decisions: VecDeque<TradeDecision>,
    profit_curve: Vec<ProfitPoint>,
    ai_model: AiModelInfo,
    last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct Limits {
    recent_trades: usize,
    ai_decisions: usize,
    profit_curve: usize,
}

/// Single owner of everything the dashboard shows. Writers go through the
/// `apply_*`/`refresh_*`/`set_*` calls; readers get a cloned [`DashboardView`].
pub struct DashboardState {
    symbol: String,
    timeframe: String,
    limits: Limits,
    inner: RwLock<Inner>,
}

impl DashboardState {
    pub fn new(cfg: &Config) -> Self {
        Self {
            symbol: cfg.symbol.clone(),
            timeframe: cfg.timeframe.to_string(),
            limits: Limits {
                recent_trades: cfg.limits.recent_trades,
                ai_decisions: cfg.limits.ai_decisions,
                profit_curve: cfg.limits.profit_curve,
            },
            inner: RwLock::new(Inner {
                market: None,
                position: None,
                performance: PerformanceView::unavailable("not computed yet"),
                recent_trades: Vec::new(),
                ai_decisions: VecDeque::new(),
                profit_curve: Vec::new(),
                ai_model: AiModelInfo {
                    provider: cfg.ai_provider.as_str().to_string(),
                    model: cfg.ai_model.clone(),
                    status: AiStatus::Unknown,
                    last_check: None,
                    error_message: None,
                },
                last_update: None,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn apply_market(&self, snapshot: &MarketSnapshot) {
        let mut inner = self.write();
        inner.last_update = Some(snapshot.timestamp);
        inner.market = Some(snapshot.clone());
    }

    pub fn apply_decision(&self, decision: &TradeDecision) {
        let mut inner = self.write();
        if inner.ai_decisions.len() >= self.limits.ai_decisions {
            inner.ai_decisions.pop_front();
        }
        inner.ai_decisions.push_back(decision.clone());
    }

    /// Recomputes position, performance, trades and profit curve from the
    /// ledger. A read failure marks performance unavailable and keeps the
    /// rest as it was.
    pub fn refresh_from_ledger(&self, ledger: &dyn Ledger, now: DateTime<Utc>) {
        let events = match ledger.all() {
            Ok(events) => events,
            Err(e) => {
                warn!("Dashboard refresh failed, ledger unreadable: {}", e);
                let mut inner = self.write();
                inner.performance = PerformanceView::unavailable(e.to_string());
                inner.last_update = Some(now);
                return;
            }
        };

        let result = PerformanceAggregator::compute(&events);
        let performance = PerformanceView::from_result(&result);
        let profit_curve = match &result {
            Ok(report) => {
                let series = profit_series(&report.round_trips);
                let start = series.len().saturating_sub(self.limits.profit_curve);
                series[start..].to_vec()
            }
            Err(_) => Vec::new(),
        };
        let position = PositionTracker::replay(&events).current(&self.symbol).cloned();
        let recent_trades = events
            .iter()
            .rev()
            .take(self.limits.recent_trades)
            .cloned()
            .collect();

        let mut inner = self.write();
        inner.performance = performance;
        inner.profit_curve = profit_curve;
        inner.position = position;
        inner.recent_trades = recent_trades;
        inner.last_update = Some(now);
    }

    pub fn set_ai_status(&self, status: AiStatus, error: Option<String>, now: DateTime<Utc>) {
        let mut inner = self.write();
        inner.ai_model.status = status;
        inner.ai_model.error_message = error;
        inner.ai_model.last_check = Some(now);
    }

    pub fn snapshot(&self) -> DashboardView {
        let inner = self.read();
        let price = inner.market.as_ref().map(|m| m.price);
        let position = inner.position.clone().map(|p| PositionView {
            unrealized_pnl: price.map(|px| p.unrealized_pnl(px)),
            position: p,
        });

        DashboardView {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
            price,
            price_change_pct: inner.market.as_ref().map(|m| m.price_change_pct).unwrap_or(0.0),
            price_time: inner.market.as_ref().map(|m| m.timestamp),
            is_fallback: inner.market.as_ref().map(|m| m.is_fallback).unwrap_or(false),
            data_source: inner.market.as_ref().map(|m| m.source),
            position,
            performance: inner.performance.clone(),
            recent_trades: inner.recent_trades.clone(),
            ai_decisions: inner.ai_decisions.iter().cloned().collect(),
            profit_curve: inner.profit_curve.clone(),
            ai_model: inner.ai_model.clone(),
            last_update: inner.last_update,
        }
    }
}
