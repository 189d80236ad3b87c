use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{Confidence, TradeAction};

/// A numeric ledger column exactly as it was written.
///
/// Older rows hold NULLs and strings in `price`/`amount`; they are kept
/// verbatim so bad data stays visible instead of turning into zeroes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

impl RawNumber {
    /// Finite numeric value, parsing text that is a plain number.
    pub fn numeric(&self) -> Option<f64> {
        match self {
            RawNumber::Number(v) => Some(*v).filter(|v| v.is_finite()),
            RawNumber::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            RawNumber::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, RawNumber::Missing)
    }
}

impl From<f64> for RawNumber {
    fn from(v: f64) -> Self {
        RawNumber::Number(v)
    }
}

impl From<Option<f64>> for RawNumber {
    fn from(v: Option<f64>) -> Self {
        v.map(RawNumber::Number).unwrap_or(RawNumber::Missing)
    }
}

impl From<&str> for RawNumber {
    fn from(s: &str) -> Self {
        RawNumber::Text(s.to_string())
    }
}

impl fmt::Display for RawNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawNumber::Number(v) => write!(f, "{}", v),
            RawNumber::Text(s) => write!(f, "{:?}", s),
            RawNumber::Missing => write!(f, "null"),
        }
    }
}

/// Why a stored event is left out of replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    MissingPrice,
    MissingAmount,
    NonNumericPrice { raw: String },
    NonNumericAmount { raw: String },
    NonPositivePrice { value: f64 },
    NonPositiveAmount { value: f64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingPrice => write!(f, "price missing"),
            SkipReason::MissingAmount => write!(f, "amount missing"),
            SkipReason::NonNumericPrice { raw } => write!(f, "price not numeric ({})", raw),
            SkipReason::NonNumericAmount { raw } => write!(f, "amount not numeric ({})", raw),
            SkipReason::NonPositivePrice { value } => write!(f, "price <= 0 ({})", value),
            SkipReason::NonPositiveAmount { value } => write!(f, "amount <= 0 ({})", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub timeframe: String,
    pub action: TradeAction,
    #[serde(default)]
    pub price: RawNumber,
    #[serde(default)]
    pub amount: RawNumber,
    #[serde(default)]
    pub stop_loss: RawNumber,
    #[serde(default)]
    pub take_profit: RawNumber,
    pub confidence: Confidence,
    #[serde(default)]
    pub reason: String,
}

impl TradeEvent {
    pub fn new(
        action: TradeAction,
        symbol: &str,
        timeframe: &str,
        price: impl Into<RawNumber>,
        amount: impl Into<RawNumber>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            action,
            price: price.into(),
            amount: amount.into(),
            stop_loss: RawNumber::Missing,
            take_profit: RawNumber::Missing,
            confidence: Confidence::Medium,
            reason: String::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_levels(mut self, stop_loss: impl Into<RawNumber>, take_profit: impl Into<RawNumber>) -> Self {
        self.stop_loss = stop_loss.into();
        self.take_profit = take_profit.into();
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Price and amount when both are finite and strictly positive.
    pub fn valid_fill(&self) -> Result<(f64, f64), SkipReason> {
        let price = check_positive(&self.price, Field::Price)?;
        let amount = check_positive(&self.amount, Field::Amount)?;
        Ok((price, amount))
    }
}

#[derive(Clone, Copy)]
enum Field {
    Price,
    Amount,
}

fn check_positive(raw: &RawNumber, field: Field) -> Result<f64, SkipReason> {
    if raw.is_missing() {
        return Err(match field {
            Field::Price => SkipReason::MissingPrice,
            Field::Amount => SkipReason::MissingAmount,
        });
    }
    let value = raw.numeric().ok_or_else(|| {
        let raw = raw.to_string();
        match field {
            Field::Price => SkipReason::NonNumericPrice { raw },
            Field::Amount => SkipReason::NonNumericAmount { raw },
        }
    })?;
    if value <= 0.0 {
        return Err(match field {
            Field::Price => SkipReason::NonPositivePrice { value },
            Field::Amount => SkipReason::NonPositiveAmount { value },
        });
    }
    Ok(value)
}
