pub mod ai_client;
pub mod parse;

pub use ai_client::AiClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::CollaboratorError;
use crate::exchange::MarketSnapshot;
use crate::models::{Confidence, Signal};
use crate::trading::position_tracker::Position;

/// Structured decision from a signal source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub signal: Signal,
    pub confidence: Confidence,
    pub reason: String,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub strategy_tag: Option<String>,
    /// Produced locally because the source failed, not by the source.
    #[serde(default)]
    pub is_fallback: bool,
    pub timestamp: DateTime<Utc>,
}

/// Conservative HOLD used whenever the source cannot be consulted.
pub fn fallback_decision(price: f64, reason: &str, now: DateTime<Utc>) -> TradeDecision {
    let level = |factor: f64| Some(price * factor).filter(|v| v.is_finite() && *v > 0.0);
    TradeDecision {
        signal: Signal::Hold,
        confidence: Confidence::Low,
        reason: reason.to_string(),
        stop_loss: level(0.98),
        take_profit: level(1.02),
        strategy_tag: Some("fallback".to_string()),
        is_fallback: true,
        timestamp: now,
    }
}

/// What a signal source sees for one tick.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub snapshot: MarketSnapshot,
    pub last_signal: Option<(Signal, Confidence)>,
    pub position: Option<Position>,
}

#[async_trait]
pub trait SignalSource: Send + Sync {
    fn name(&self) -> &str;

    async fn decide(&self, ctx: &DecisionContext) -> Result<TradeDecision, CollaboratorError>;

    /// Cheap reachability check for status reporting.
    async fn ping(&self) -> Result<(), CollaboratorError>;
}

/// Decision plus the last failure seen while obtaining it.
#[derive(Debug)]
pub struct RetriedDecision {
    pub decision: TradeDecision,
    pub error: Option<CollaboratorError>,
}

/// Up to `attempts` calls, each bounded by `timeout`. Exhaustion yields the
/// HOLD/LOW fallback instead of an error.
pub async fn decide_with_retry(
    source: &dyn SignalSource,
    ctx: &DecisionContext,
    timeout: Duration,
    attempts: usize,
    retry_delay: Duration,
) -> RetriedDecision {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        let err = match tokio::time::timeout(timeout, source.decide(ctx)).await {
            Ok(Ok(decision)) if !decision.is_fallback => {
                info!(
                    "{} decision: {} / {} ({})",
                    source.name(),
                    decision.signal,
                    decision.confidence,
                    decision.reason
                );
                return RetriedDecision {
                    decision,
                    error: None,
                };
            }
            Ok(Ok(_)) => CollaboratorError::Malformed("source returned a fallback".to_string()),
            Ok(Err(e)) => e,
            Err(_) => CollaboratorError::Timeout(timeout.as_secs()),
        };

        warn!(
            "{} attempt {}/{} failed: {}",
            source.name(),
            attempt,
            attempts,
            err
        );
        let disabled = matches!(err, CollaboratorError::Disabled(_));
        last_error = Some(err);

        if disabled {
            break;
        }
        if attempt < attempts && !retry_delay.is_zero() {
            tokio::time::sleep(retry_delay).await;
        }
    }

    let reason = format!("{} unavailable, holding", source.name());
    RetriedDecision {
        decision: fallback_decision(ctx.snapshot.price, &reason, ctx.snapshot.timestamp),
        error: last_error,
    }
}

/// Bounded, oldest-first record of recent decisions.
#[derive(Debug, Clone)]
pub struct SignalHistory {
    entries: VecDeque<TradeDecision>,
    limit: usize,
}

impl SignalHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, decision: TradeDecision) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(decision);
    }

    pub fn last(&self) -> Option<&TradeDecision> {
        self.entries.back()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.entries.iter().map(|d| d.signal).collect()
    }

    /// How many of the stored decisions carry `signal`.
    pub fn count(&self, signal: Signal) -> usize {
        self.entries.iter().filter(|d| d.signal == signal).count()
    }

    /// True when the last three decisions agree.
    pub fn streak_of_three(&self) -> bool {
        let n = self.entries.len();
        n >= 3 && {
            let s = self.entries[n - 1].signal;
            self.entries.range(n - 3..).all(|d| d.signal == s)
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
