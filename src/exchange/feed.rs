use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::CollaboratorError;
use crate::exchange::Exchange;
use crate::models::{CandleSeries, Timeframe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Live,
    /// Last good snapshot replayed because the feed is down.
    Cached,
}

/// Latest bar plus the recent series, as consumed by the signal source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub price: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
    pub price_change_pct: f64,
    pub bars: CandleSeries,
    pub is_fallback: bool,
    pub source: DataSource,
}

impl MarketSnapshot {
    pub fn from_series(
        symbol: &str,
        timeframe: Timeframe,
        bars: CandleSeries,
    ) -> Result<Self, CollaboratorError> {
        let last = bars
            .last()
            .ok_or_else(|| CollaboratorError::Malformed("no bars returned".to_string()))?
            .clone();
        if !last.close.is_finite() || last.close <= 0.0 {
            return Err(CollaboratorError::Malformed(format!(
                "last close is {}",
                last.close
            )));
        }
        Ok(Self {
            symbol: symbol.to_string(),
            timeframe,
            price: last.close,
            high: last.high,
            low: last.low,
            volume: last.volume,
            timestamp: last.timestamp,
            price_change_pct: bars.last_change_pct(),
            bars,
            is_fallback: false,
            source: DataSource::Live,
        })
    }
}

/// Bounded-retry wrapper around an [`Exchange`].
pub struct MarketFeed {
    exchange: Box<dyn Exchange>,
    symbol: String,
    timeframe: Timeframe,
    data_points: usize,
    timeout: Duration,
    attempts: usize,
    retry_delay: Duration,
    last_good: Option<MarketSnapshot>,
}

impl MarketFeed {
    pub fn new(exchange: Box<dyn Exchange>, cfg: &Config) -> Self {
        Self {
            exchange,
            symbol: cfg.symbol.clone(),
            timeframe: cfg.timeframe,
            data_points: cfg.data_points,
            timeout: Duration::from_secs(cfg.request_timeout_secs),
            attempts: cfg.max_retries.max(1),
            retry_delay: Duration::from_secs(1),
            last_good: None,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Live snapshot, or the last good one flagged as fallback once retries run
    /// out. Errors only if nothing real has ever been fetched.
    pub async fn snapshot(&mut self) -> Result<MarketSnapshot, CollaboratorError> {
        let mut last_err = CollaboratorError::Malformed("no attempt made".to_string());

        for attempt in 1..=self.attempts {
            let fetched = tokio::time::timeout(
                self.timeout,
                self.exchange.fetch_ohlcv(self.timeframe, self.data_points),
            )
            .await;

            let result = match fetched {
                Ok(Ok(bars)) => MarketSnapshot::from_series(&self.symbol, self.timeframe, bars),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(CollaboratorError::Timeout(self.timeout.as_secs())),
            };

            match result {
                Ok(snapshot) => {
                    self.last_good = Some(snapshot.clone());
                    return Ok(snapshot);
                }
                Err(e) => {
                    warn!(
                        "Market data attempt {}/{} failed: {}",
                        attempt, self.attempts, e
                    );
                    last_err = e;
                }
            }

            if attempt < self.attempts && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        match &self.last_good {
            Some(good) => {
                info!(
                    "Serving cached {} snapshot from {} as fallback",
                    good.symbol, good.timestamp
                );
                let mut cached = good.clone();
                cached.is_fallback = true;
                cached.source = DataSource::Cached;
                Ok(cached)
            }
            None => Err(last_err),
        }
    }

    pub fn last_good(&self) -> Option<&MarketSnapshot> {
        self.last_good.as_ref()
    }
}
