//! Core data types used across the data pipeline

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::DataError;

/// Quote currency used when a symbol is given without one
pub const DEFAULT_QUOTE: &str = "USDT";

/// Validation errors for candle data
#[derive(Debug, Error, PartialEq)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be non-negative: open={open}, high={high}, low={low}, close={close}")]
    NegativePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("candle has missing (NaN) fields")]
    MissingValue,
}

/// OHLCV candlestick data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self::new_unchecked(datetime, open, high, low, close, volume);
        candle.validate()?;
        Ok(candle)
    }

    /// Create a candle without validation. Exchange and bundle rows go through
    /// here: invariant violations are reported by the validator, never fixed.
    pub fn new_unchecked(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Open time in epoch milliseconds
    pub fn timestamp_ms(&self) -> i64 {
        self.datetime.timestamp_millis()
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        let fields = [self.open, self.high, self.low, self.close, self.volume];
        if fields.iter().any(|v| v.is_nan()) {
            return Err(CandleValidationError::MissingValue);
        }

        if self.open < 0.0 || self.high < 0.0 || self.low < 0.0 || self.close < 0.0 {
            return Err(CandleValidationError::NegativePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    /// Check if the candle is valid without returning detailed error
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Market pair symbol in `BASE/QUOTE` form, backed by `Arc<str>` for cheap cloning
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    /// Normalize user input into `BASE/QUOTE`.
    ///
    /// Accepts `btc`, `BTC/USDT` and `BTCUSDT`. A bare base gets `quote` appended;
    /// a concatenated pair is split when it ends with `quote`.
    pub fn parse(input: &str, quote: &str) -> Result<Self, DataError> {
        let cleaned = input.trim().to_uppercase();
        let quote = quote.trim().to_uppercase();

        if cleaned.is_empty() || quote.is_empty() {
            return Err(DataError::InvalidSymbol(input.to_string()));
        }

        let (base, q) = match cleaned.split_once('/') {
            Some((base, q)) => (base.to_string(), q.to_string()),
            None => match cleaned.strip_suffix(quote.as_str()) {
                Some(base) if !base.is_empty() => (base.to_string(), quote.clone()),
                _ => (cleaned.clone(), quote.clone()),
            },
        };

        let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid(&base) || !valid(&q) {
            return Err(DataError::InvalidSymbol(input.to_string()));
        }

        Ok(Symbol::new(format!("{}/{}", base, q)))
    }

    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base asset, e.g. `BTC` for `BTC/USDT`
    pub fn base(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }

    /// Quote asset, e.g. `USDT` for `BTC/USDT`
    pub fn quote(&self) -> &str {
        self.0.split_once('/').map(|(_, q)| q).unwrap_or(DEFAULT_QUOTE)
    }

    /// Exchange pair form, e.g. `BTCUSDT`
    pub fn exchange_pair(&self) -> String {
        format!("{}{}", self.base(), self.quote())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unit part of a timeframe string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
    /// Calendar month, approximated as 30 days for arithmetic
    Month,
}

impl TimeUnit {
    fn suffix(self) -> char {
        match self {
            TimeUnit::Minute => 'm',
            TimeUnit::Hour => 'h',
            TimeUnit::Day => 'd',
            TimeUnit::Week => 'w',
            TimeUnit::Month => 'M',
        }
    }
}

/// Largest bar count accepted in a timeframe; keeps `duration()` arithmetic in range
pub const MAX_TIMEFRAME_COUNT: u32 = 1000;

/// Candle interval such as `1m`, `4h`, `1d`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timeframe {
    count: u32,
    unit: TimeUnit,
}

impl Timeframe {
    pub fn new(count: u32, unit: TimeUnit) -> Result<Self, DataError> {
        if count == 0 || count > MAX_TIMEFRAME_COUNT {
            return Err(DataError::InvalidTimeframe(format!("{}{}", count, unit.suffix())));
        }
        Ok(Self { count, unit })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Length of one bar
    pub fn duration(&self) -> Duration {
        let n = self.count as i64;
        match self.unit {
            TimeUnit::Minute => Duration::minutes(n),
            TimeUnit::Hour => Duration::hours(n),
            TimeUnit::Day => Duration::days(n),
            TimeUnit::Week => Duration::weeks(n),
            TimeUnit::Month => Duration::days(30 * n),
        }
    }
}

impl FromStr for Timeframe {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || DataError::InvalidTimeframe(s.to_string());

        let unit_char = s.chars().last().ok_or_else(err)?;
        let digits = &s[..s.len() - unit_char.len_utf8()];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        let count: u32 = digits.parse().map_err(|_| err())?;

        let unit = match unit_char {
            'm' => TimeUnit::Minute,
            'h' | 'H' => TimeUnit::Hour,
            'd' | 'D' => TimeUnit::Day,
            'w' | 'W' => TimeUnit::Week,
            'M' => TimeUnit::Month,
            _ => return Err(err()),
        };

        Timeframe::new(count, unit).map_err(|_| err())
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl Serialize for Timeframe {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timeframe {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_candle_validation() {
        assert!(Candle::new(t0(), 100.0, 105.0, 95.0, 102.0, 10.0).is_ok());
        assert!(Candle::new(t0(), 0.0, 0.0, 0.0, 0.0, 0.0).is_ok());

        assert_eq!(
            Candle::new(t0(), 100.0, 90.0, 95.0, 92.0, 10.0).unwrap_err(),
            CandleValidationError::HighLessThanLow { high: 90.0, low: 95.0 }
        );
        assert!(matches!(
            Candle::new(t0(), -1.0, 105.0, 95.0, 102.0, 10.0),
            Err(CandleValidationError::NegativePrice { .. })
        ));
        assert!(matches!(
            Candle::new(t0(), 100.0, 105.0, 95.0, 102.0, -1.0),
            Err(CandleValidationError::NegativeVolume(_))
        ));
        assert!(matches!(
            Candle::new(t0(), 110.0, 105.0, 95.0, 102.0, 1.0),
            Err(CandleValidationError::OpenOutOfRange { .. })
        ));
        assert!(!Candle::new_unchecked(t0(), f64::NAN, 105.0, 95.0, 102.0, 1.0).is_valid());
    }

    #[test]
    fn test_symbol_parse() {
        let btc = Symbol::parse("btc", "USDT").unwrap();
        assert_eq!(btc.as_str(), "BTC/USDT");
        assert_eq!(btc.base(), "BTC");
        assert_eq!(btc.quote(), "USDT");
        assert_eq!(btc.exchange_pair(), "BTCUSDT");

        assert_eq!(Symbol::parse("ETHUSDT", "USDT").unwrap().as_str(), "ETH/USDT");
        assert_eq!(Symbol::parse("sol/btc", "USDT").unwrap().as_str(), "SOL/BTC");
        assert_eq!(Symbol::parse("USDT", "USDT").unwrap().as_str(), "USDT/USDT");

        assert!(Symbol::parse("", "USDT").is_err());
        assert!(Symbol::parse("BTC/", "USDT").is_err());
        assert!(Symbol::parse("BT C", "USDT").is_err());
    }

    #[test]
    fn test_timeframe_parse() {
        let tf: Timeframe = "1m".parse().unwrap();
        assert_eq!(tf.duration(), Duration::minutes(1));
        assert_eq!(tf.to_string(), "1m");

        assert_eq!("4h".parse::<Timeframe>().unwrap().duration(), Duration::hours(4));
        assert_eq!("1d".parse::<Timeframe>().unwrap().duration(), Duration::days(1));
        assert_eq!("1w".parse::<Timeframe>().unwrap().duration(), Duration::weeks(1));
        assert_eq!("1M".parse::<Timeframe>().unwrap().duration(), Duration::days(30));
        assert_eq!("15m".parse::<Timeframe>().unwrap().count(), 15);

        for bad in ["", "h", "0h", "1x", "-1d", "1.5h", "d1"] {
            assert!(bad.parse::<Timeframe>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_timeframe_count_is_bounded() {
        assert!("1000M".parse::<Timeframe>().is_ok());
        assert!("1001m".parse::<Timeframe>().is_err());
        assert!("4294967295M".parse::<Timeframe>().is_err());
        assert!(Timeframe::new(MAX_TIMEFRAME_COUNT + 1, TimeUnit::Day).is_err());
    }
}
