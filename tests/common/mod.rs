#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

use ai_paper_trader::config::{AiProvider, Config, GateConfig, MemoryLimits};
use ai_paper_trader::error::CollaboratorError;
use ai_paper_trader::exchange::Exchange;
use ai_paper_trader::models::{Candle, CandleSeries, Confidence, Signal, Timeframe};
use ai_paper_trader::signals::{DecisionContext, SignalSource, TradeDecision};

pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Create 15m candles from (open, high, low, close) tuples.
pub fn make_candles(data: &[(f64, f64, f64, f64)]) -> CandleSeries {
    let candles: Vec<Candle> = data
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Candle {
            timestamp: base_time() + Duration::minutes(15 * i as i64),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 100.0,
        })
        .collect();

    CandleSeries::new(candles)
}

/// Series whose last close is `price`.
pub fn bars_ending_at(price: f64) -> CandleSeries {
    make_candles(&[
        (price - 2.0, price - 1.0, price - 3.0, price - 1.5),
        (price - 1.5, price + 1.0, price - 2.0, price),
    ])
}

/// Serves scripted bars; `None` entries simulate an outage.
pub struct MockExchange {
    pub script: VecDeque<Option<CandleSeries>>,
}

impl MockExchange {
    pub fn new(script: Vec<Option<CandleSeries>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn fetch_ohlcv(
        &mut self,
        _tf: Timeframe,
        _limit: usize,
    ) -> Result<CandleSeries, CollaboratorError> {
        self.script
            .pop_front()
            .flatten()
            .ok_or(CollaboratorError::Status {
                service: "mock",
                status: 503,
                body: "outage".to_string(),
            })
    }
}

/// Answers from a queue of decisions; an empty queue is a failure.
pub struct ScriptedSource {
    pub answers: Mutex<VecDeque<(Signal, Confidence)>>,
}

impl ScriptedSource {
    pub fn new(answers: Vec<(Signal, Confidence)>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
        }
    }
}

#[async_trait]
impl SignalSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(&self, ctx: &DecisionContext) -> Result<TradeDecision, CollaboratorError> {
        let next = self.answers.lock().unwrap().pop_front();
        let (signal, confidence) =
            next.ok_or_else(|| CollaboratorError::Malformed("no answer".to_string()))?;
        Ok(TradeDecision {
            signal,
            confidence,
            reason: "scripted".to_string(),
            stop_loss: None,
            take_profit: None,
            strategy_tag: None,
            is_fallback: false,
            timestamp: ctx.snapshot.timestamp,
        })
    }

    async fn ping(&self) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        symbol: "BTCUSDT".to_string(),
        timeframe: Timeframe::M15,
        trade_amount: 1.0,
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
