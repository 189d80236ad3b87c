pub mod candle;
pub mod side;
pub mod timeframe;
pub mod trade_event;

pub use candle::{Candle, CandleSeries};
pub use side::*;
pub use timeframe::Timeframe;
pub use trade_event::{RawNumber, SkipReason, TradeEvent};
