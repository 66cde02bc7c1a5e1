//! Binance API client for fetching historical kline (candlestick) data
//!
//! No API key required for public market data endpoints.
//!
//! # Example
//! ```no_run
//! use crypto_data::binance::BinanceClient;
//! use crypto_data::config::ExchangeConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = BinanceClient::new(&ExchangeConfig::default())?;
//!     let klines = client.get_klines("BTCUSDT", "1h", None, None, Some(100)).await?;
//!     println!("Fetched {} klines", klines.len());
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, warn};

use super::types::BinanceKline;
use crate::common::RateLimiter;
use crate::config::ExchangeConfig;
use crate::fetch::CandleSource;
use crate::{Candle, Symbol, Timeframe};

/// Maximum klines per request (Binance limit)
pub const MAX_KLINES_PER_REQUEST: u32 = 1000;

/// Binance API client. Owns its rate limiter.
#[derive(Debug, Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    limiter: RateLimiter,
}

impl BinanceClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(BinanceClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::with_min_interval(config.min_request_interval()),
        })
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Fetch klines (candlestick) data from Binance
    ///
    /// # Arguments
    /// * `symbol` - Binance trading pair (e.g., "BTCUSDT")
    /// * `interval` - Timeframe (e.g., "1h", "4h", "1d")
    /// * `start_time` - Optional start time in milliseconds
    /// * `end_time` - Optional end time in milliseconds
    /// * `limit` - Optional number of klines to fetch (max 1000)
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<BinanceKline>> {
        let url = format!("{}/klines", self.base_url);

        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
        ];

        if let Some(start) = start_time {
            params.push(("startTime", start.to_string()));
        }

        if let Some(end) = end_time {
            params.push(("endTime", end.to_string()));
        }

        let limit = limit
            .unwrap_or(MAX_KLINES_PER_REQUEST)
            .min(MAX_KLINES_PER_REQUEST);
        params.push(("limit", limit.to_string()));

        debug!(
            "Fetching klines: symbol={}, interval={}, start={:?}, limit={}",
            symbol, interval, start_time, limit
        );

        self.limiter.acquire().await;

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .context("Failed to send request to Binance")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {}: {}", status, body);
        }

        let raw_data: Vec<Vec<serde_json::Value>> = response
            .json()
            .await
            .context("Failed to parse Binance response")?;

        let klines: Vec<BinanceKline> = raw_data
            .iter()
            .filter_map(|row| BinanceKline::from_raw(row))
            .collect();

        Ok(klines)
    }
}

impl CandleSource for BinanceClient {
    fn max_page_size(&self) -> u32 {
        MAX_KLINES_PER_REQUEST
    }

    async fn fetch_page(
        &self,
        symbol: &Symbol,
        timeframe: &Timeframe,
        since_ms: Option<i64>,
        limit: u32,
    ) -> Vec<Candle> {
        let pair = symbol.exchange_pair();
        let interval = timeframe.to_string();

        match self
            .get_klines(&pair, &interval, since_ms, None, Some(limit))
            .await
        {
            Ok(klines) => klines.iter().filter_map(BinanceKline::to_candle).collect(),
            Err(e) => {
                warn!("Error fetching {} {} klines: {:#}", pair, interval, e);
                Vec::new()
            }
        }
    }
}
