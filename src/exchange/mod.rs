pub mod binance;
pub mod feed;

pub use binance::BinanceClient;
pub use feed::{DataSource, MarketFeed, MarketSnapshot};

use async_trait::async_trait;

use crate::error::CollaboratorError;
use crate::models::{CandleSeries, Timeframe};

#[async_trait]
pub trait Exchange: Send + Sync {
    async fn fetch_ohlcv(
        &mut self,
        tf: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries, CollaboratorError>;
}
