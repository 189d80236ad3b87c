use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    pub fn open_action(self) -> TradeAction {
        match self {
            Side::Long => TradeAction::OpenLong,
            Side::Short => TradeAction::OpenShort,
        }
    }

    pub fn close_action(self) -> TradeAction {
        match self {
            Side::Long => TradeAction::CloseLong,
            Side::Short => TradeAction::CloseShort,
        }
    }

    /// Realized P&L of a round-trip on this side.
    pub fn pnl(self, entry_price: f64, exit_price: f64, size: f64) -> f64 {
        match self {
            Side::Long => (exit_price - entry_price) * size,
            Side::Short => (entry_price - exit_price) * size,
        }
    }
}

/// The four ledger actions. Anything else is not a ledger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::OpenLong => "open_long",
            TradeAction::OpenShort => "open_short",
            TradeAction::CloseLong => "close_long",
            TradeAction::CloseShort => "close_short",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<TradeAction> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open_long" => Some(TradeAction::OpenLong),
            "open_short" => Some(TradeAction::OpenShort),
            "close_long" => Some(TradeAction::CloseLong),
            "close_short" => Some(TradeAction::CloseShort),
            _ => None,
        }
    }

    pub fn side(&self) -> Side {
        match self {
            TradeAction::OpenLong | TradeAction::CloseLong => Side::Long,
            TradeAction::OpenShort | TradeAction::CloseShort => Side::Short,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, TradeAction::OpenLong | TradeAction::OpenShort)
    }

    /// Order direction that produces this action: closing a long sells, closing a short buys.
    pub fn signal(&self) -> Signal {
        match self {
            TradeAction::OpenLong | TradeAction::CloseShort => Signal::Buy,
            TradeAction::OpenShort | TradeAction::CloseLong => Signal::Sell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Signal> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" | "LONG" => Some(Signal::Buy),
            "SELL" | "SHORT" => Some(Signal::Sell),
            "HOLD" => Some(Signal::Hold),
            _ => None,
        }
    }

    /// Side this signal would open, `None` for HOLD.
    pub fn side(&self) -> Option<Side> {
        match self {
            Signal::Buy => Some(Side::Long),
            Signal::Sell => Some(Side::Short),
            Signal::Hold => None,
        }
    }
}

/// Ordered LOW < MEDIUM < HIGH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "LOW",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Confidence> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Confidence::Low),
            "MEDIUM" | "MID" => Some(Confidence::Medium),
            "HIGH" => Some(Confidence::High),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_ordinal() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::Medium < Confidence::High);
    }

    #[test]
    fn close_actions_trade_against_their_side() {
        assert_eq!(TradeAction::CloseLong.signal(), Signal::Sell);
        assert_eq!(TradeAction::CloseShort.signal(), Signal::Buy);
        assert_eq!(Side::Short.close_action(), TradeAction::CloseShort);
    }

    #[test]
    fn pnl_sign_follows_side() {
        assert_eq!(Side::Long.pnl(100.0, 110.0, 1.0), 10.0);
        assert_eq!(Side::Short.pnl(105.0, 95.0, 1.0), 10.0);
        assert_eq!(Side::Short.pnl(100.0, 110.0, 2.0), -20.0);
    }

    #[test]
    fn loose_parsing() {
        assert_eq!(TradeAction::from_str_loose(" OPEN_LONG "), Some(TradeAction::OpenLong));
        assert_eq!(TradeAction::from_str_loose("hold"), None);
        assert_eq!(Signal::from_str_loose("buy"), Some(Signal::Buy));
        assert_eq!(Confidence::from_str_loose("medium"), Some(Confidence::Medium));
        assert_eq!(Confidence::from_str_loose("sure"), None);
    }

    #[test]
    fn serde_uses_ledger_spelling() {
        assert_eq!(
            serde_json::to_string(&TradeAction::CloseShort).unwrap(),
            "\"close_short\""
        );
        assert_eq!(serde_json::to_string(&Confidence::High).unwrap(), "\"HIGH\"");
        let s: Signal = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(s, Signal::Sell);
    }
}
