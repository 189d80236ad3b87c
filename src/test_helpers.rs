use chrono::{DateTime, Duration, Utc};

use crate::config::{AiProvider, Config, GateConfig, MemoryLimits};
use crate::error::{LedgerError, StorageError};
use crate::models::{Candle, CandleSeries, Confidence, Timeframe, TradeAction, TradeEvent};
use crate::trading::ledger::Ledger;

pub const SYMBOL: &str = "BTCUSDT";

fn base() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Fixed test clock: 2024-01-15T12:00:00Z plus `minutes`.
pub fn ts(minutes: i64) -> DateTime<Utc> {
    base() + Duration::minutes(minutes)
}

fn event(action: TradeAction, price: f64, amount: f64) -> TradeEvent {
    TradeEvent::new(action, SYMBOL, "15m", price, amount).at(ts(0))
}

pub fn open_long(price: f64, amount: f64) -> TradeEvent {
    event(TradeAction::OpenLong, price, amount)
}

pub fn open_short(price: f64, amount: f64) -> TradeEvent {
    event(TradeAction::OpenShort, price, amount)
}

pub fn close_long(price: f64, amount: f64) -> TradeEvent {
    event(TradeAction::CloseLong, price, amount)
}

pub fn close_short(price: f64, amount: f64) -> TradeEvent {
    event(TradeAction::CloseShort, price, amount)
}

/// Create candles from (open, high, low, close) tuples with auto-incrementing 15m timestamps.
pub fn make_candles(data: &[(f64, f64, f64, f64)]) -> CandleSeries {
    let candles: Vec<Candle> = data
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Candle {
            timestamp: ts(i as i64 * 15),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 100.0,
        })
        .collect();

    CandleSeries::new(candles)
}

/// Ledger whose backend is always down.
pub struct FailingLedger;

impl Ledger for FailingLedger {
    fn append_batch(&self, _events: Vec<TradeEvent>) -> Result<(), LedgerError> {
        Err(StorageError::Poisoned.into())
    }

    fn all(&self) -> Result<Vec<TradeEvent>, StorageError> {
        Err(StorageError::Poisoned)
    }

    fn recent(&self, _n: usize) -> Result<Vec<TradeEvent>, StorageError> {
        Err(StorageError::Poisoned)
    }

    fn last_open(&self) -> Result<Option<TradeEvent>, StorageError> {
        Err(StorageError::Poisoned)
    }
}

/// A Config suitable for testing: no API key, no cooldown, no confirmation.
pub fn default_test_config() -> Config {
    Config {
        symbol: SYMBOL.to_string(),
        timeframe: Timeframe::M15,
        trade_amount: 0.01,
        leverage: 10.0,
        data_points: 48,
        ledger_path: ":memory:".to_string(),
        gate: GateConfig {
            min_confidence: Confidence::Medium,
            cooldown_minutes: 0,
            require_confirmation: false,
        },
        market_base_url: "http://127.0.0.1:9".to_string(),
        ai_provider: AiProvider::Deepseek,
        ai_api_key: String::new(),
        ai_base_url: AiProvider::Deepseek.default_base_url().to_string(),
        ai_model: AiProvider::Deepseek.default_model().to_string(),
        request_timeout_secs: 1,
        max_retries: 2,
        limits: MemoryLimits {
            signal_history: 20,
            ai_decisions: 30,
            recent_trades: 50,
            profit_curve: 100,
        },
        log_level: "ERROR".to_string(),
        warnings: Vec::new(),
    }
}
