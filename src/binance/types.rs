//! Binance API types for klines (candlestick) data

use chrono::DateTime;

use crate::Candle;

/// Binance kline/candlestick data
/// API returns an array: [open_time, open, high, low, close, volume, close_time,
///                        quote_volume, trades, taker_buy_base, taker_buy_quote, ignore]
#[derive(Debug, Clone)]
pub struct BinanceKline {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
    pub quote_volume: f64,
    pub trades: u64,
}

impl BinanceKline {
    /// Parse from raw JSON array returned by Binance API
    pub fn from_raw(raw: &[serde_json::Value]) -> Option<Self> {
        if raw.len() < 9 {
            return None;
        }

        Some(BinanceKline {
            open_time: raw[0].as_i64()?,
            open: raw[1].as_str()?.parse().ok()?,
            high: raw[2].as_str()?.parse().ok()?,
            low: raw[3].as_str()?.parse().ok()?,
            close: raw[4].as_str()?.parse().ok()?,
            volume: raw[5].as_str()?.parse().ok()?,
            close_time: raw[6].as_i64()?,
            quote_volume: raw[7].as_str()?.parse().ok()?,
            trades: raw[8].as_u64()?,
        })
    }

    pub fn to_candle(&self) -> Option<Candle> {
        let datetime = DateTime::from_timestamp_millis(self.open_time)?;
        Some(Candle::new_unchecked(
            datetime,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        ))
    }
}

/// Valid Binance intervals
pub const BINANCE_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

/// Check if interval is valid for Binance
pub fn is_valid_interval(interval: &str) -> bool {
    BINANCE_INTERVALS.contains(&interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_raw() {
        let raw = json!([
            1_717_200_000_000i64,
            "67500.10",
            "67800.00",
            "67400.55",
            "67650.00",
            "123.456",
            1_717_203_599_999i64,
            "8345678.9",
            4321,
            "60.0",
            "4000000.0",
            "0"
        ]);
        let kline = BinanceKline::from_raw(raw.as_array().unwrap()).unwrap();
        assert_eq!(kline.open_time, 1_717_200_000_000);
        assert_eq!(kline.high, 67800.0);
        assert_eq!(kline.trades, 4321);

        let candle = kline.to_candle().unwrap();
        assert_eq!(candle.timestamp_ms(), 1_717_200_000_000);
        assert_eq!(candle.close, 67650.0);
        assert_eq!(candle.volume, 123.456);
    }

    #[test]
    fn test_from_raw_rejects_short_or_bad_rows() {
        assert!(BinanceKline::from_raw(json!([1, "2"]).as_array().unwrap()).is_none());
        let bad = json!([1, "x", "1", "1", "1", "1", 2, "1", 3]);
        assert!(BinanceKline::from_raw(bad.as_array().unwrap()).is_none());
    }

    #[test]
    fn test_valid_intervals() {
        assert!(is_valid_interval("1h"));
        assert!(is_valid_interval("4h"));
        assert!(is_valid_interval("1d"));
        assert!(!is_valid_interval("2d"));
    }
}
