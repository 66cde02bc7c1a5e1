//! Ordered candle series for a single (symbol, timeframe)

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::Candle;

/// Candles with strictly increasing, unique timestamps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    candles: Vec<Candle>,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from candles in any order. When a timestamp repeats,
    /// the candle appearing last in the input wins.
    pub fn from_unsorted(candles: impl IntoIterator<Item = Candle>) -> Self {
        let by_time: BTreeMap<DateTime<Utc>, Candle> =
            candles.into_iter().map(|c| (c.datetime, c)).collect();
        Self {
            candles: by_time.into_values().collect(),
        }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn into_candles(self) -> Vec<Candle> {
        self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.first().map(|c| c.datetime)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last().map(|c| c.datetime)
    }

    /// Drop every candle whose timestamp is after `end`
    pub fn trim_after(&mut self, end: DateTime<Utc>) {
        self.candles.retain(|c| c.datetime <= end);
    }

    /// Close prices in time order
    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.candles.iter().map(|c| c.close)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }
}

impl FromIterator<Candle> for Series {
    fn from_iter<I: IntoIterator<Item = Candle>>(iter: I) -> Self {
        Series::from_unsorted(iter)
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;

    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn candle(hour: i64, close: f64) -> Candle {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour);
        Candle::new_unchecked(t, close, close, close, close, 1.0)
    }

    #[test]
    fn test_from_unsorted_sorts_and_keeps_last() {
        let series = Series::from_unsorted(vec![
            candle(2, 20.0),
            candle(0, 1.0),
            candle(1, 10.0),
            candle(0, 2.0),
        ]);

        let closes: Vec<f64> = series.closes().collect();
        assert_eq!(closes, vec![2.0, 10.0, 20.0]);
        assert!(series
            .candles()
            .windows(2)
            .all(|w| w[0].datetime < w[1].datetime));
    }

    #[test]
    fn test_trim_after() {
        let mut series: Series = (0..10).map(|h| candle(h, h as f64)).collect();
        let end = series.candles()[4].datetime;
        series.trim_after(end);
        assert_eq!(series.len(), 5);
        assert_eq!(series.last_timestamp(), Some(end));
    }

    #[test]
    fn test_empty_series() {
        let series = Series::new();
        assert!(series.is_empty());
        assert_eq!(series.first_timestamp(), None);
        assert_eq!(series.last_timestamp(), None);
    }
}
