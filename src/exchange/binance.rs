use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::Config;
use crate::error::CollaboratorError;
use crate::exchange::Exchange;
use crate::models::{Candle, CandleSeries, Timeframe};

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

/// Public USDⓈ-M futures market data. No keys needed.
pub struct BinanceClient {
    client: Client,
    base_url: String,
    symbol: String,
    last_request: Option<Instant>,
    cache: HashMap<String, (Instant, CandleSeries)>,
    cache_ttl: Duration,
}

impl BinanceClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: cfg.market_base_url.trim_end_matches('/').to_string(),
            symbol: cfg.symbol.replace(['/', '-'], "").to_uppercase(),
            last_request: None,
            cache: HashMap::new(),
            cache_ttl: Duration::from_secs(5),
        }
    }

    async fn rate_limit(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    async fn get(&mut self, path: &str, query: &[(&str, String)]) -> Result<Value, CollaboratorError> {
        self.rate_limit().await;

        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                service: "binance",
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json().await?)
    }
}

/// Kline rows are positional arrays with prices as strings.
pub fn parse_klines(data: &Value) -> Result<CandleSeries, CollaboratorError> {
    let rows = data
        .as_array()
        .ok_or_else(|| CollaboratorError::Malformed("klines is not an array".to_string()))?;

    let field = |row: &[Value], i: usize| -> Option<f64> {
        match row.get(i)? {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    };

    let mut candles: Vec<Candle> = rows
        .iter()
        .filter_map(|row| {
            let row = row.as_array()?;
            let open_time = row.first()?.as_i64()?;
            Some(Candle {
                timestamp: DateTime::from_timestamp_millis(open_time)?,
                open: field(row, 1)?,
                high: field(row, 2)?,
                low: field(row, 3)?,
                close: field(row, 4)?,
                volume: field(row, 5)?,
            })
        })
        .collect();

    if candles.is_empty() && !rows.is_empty() {
        return Err(CollaboratorError::Malformed("no readable kline rows".to_string()));
    }

    candles.sort_by_key(|c| c.timestamp);
    Ok(CandleSeries::new(candles))
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn fetch_ohlcv(
        &mut self,
        tf: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries, CollaboratorError> {
        let cache_key = format!("{}_{}_{}", self.symbol, tf, limit);
        if let Some((cached_at, series)) = self.cache.get(&cache_key) {
            if cached_at.elapsed() < self.cache_ttl {
                return Ok(series.clone());
            }
        }

        let query = [
            ("symbol", self.symbol.clone()),
            ("interval", tf.as_str().to_string()),
            ("limit", limit.to_string()),
        ];
        let data = self.get("/fapi/v1/klines", &query).await?;
        let series = parse_klines(&data)?;
        debug!("Fetched {} {} bars for {}", series.len(), tf, self.symbol);

        self.cache.insert(cache_key, (Instant::now(), series.clone()));
        Ok(series)
    }
}
