use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::GateConfig;
use crate::models::{Confidence, Side, Signal};

/// Everything the gate looks at for one fresh signal.
#[derive(Debug, Clone)]
pub struct GateRequest<'a> {
    pub signal: Signal,
    pub confidence: Confidence,
    /// Side currently held for the symbol, if any.
    pub position: Option<Side>,
    /// Oldest first; the newest entry may be `signal` itself.
    pub recent_signals: &'a [Signal],
    pub last_open_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Hold,
    LowConfidence,
    Cooldown,
    Unconfirmed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::Hold => "hold signal",
            RejectReason::LowConfidence => "confidence below minimum",
            RejectReason::Cooldown => "within cooldown of last open",
            RejectReason::Unconfirmed => "signal not confirmed by history",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDecision {
    Accept,
    Reject(RejectReason),
}

impl GateDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GateDecision::Accept)
    }
}

/// Last N signals inspected for first-entry confirmation, and how many must agree.
const CONFIRM_WINDOW: usize = 3;
const CONFIRM_MIN_MATCHES: usize = 2;

pub struct ExecutionGate {
    config: GateConfig,
}

impl ExecutionGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Rules run in order and the first failure wins.
    pub fn evaluate(&self, req: &GateRequest<'_>) -> GateDecision {
        if req.signal == Signal::Hold {
            return GateDecision::Reject(RejectReason::Hold);
        }

        if req.confidence < self.config.min_confidence {
            return GateDecision::Reject(RejectReason::LowConfidence);
        }

        if self.config.cooldown_minutes > 0 {
            if let Some(last) = req.last_open_at {
                // A cooldown too large for chrono never expires.
                let within = match Duration::try_minutes(self.config.cooldown_minutes) {
                    Some(cooldown) => req.now - last < cooldown,
                    None => true,
                };
                if within {
                    return GateDecision::Reject(RejectReason::Cooldown);
                }
            }
        }

        if self.config.require_confirmation && req.position.is_none() {
            let start = req.recent_signals.len().saturating_sub(CONFIRM_WINDOW);
            let matches = req.recent_signals[start..]
                .iter()
                .filter(|s| **s == req.signal)
                .count();
            if matches < CONFIRM_MIN_MATCHES {
                return GateDecision::Reject(RejectReason::Unconfirmed);
            }
        }

        GateDecision::Accept
    }
}
