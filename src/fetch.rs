//! Chunked range fetching on top of a page-at-a-time candle source.

use chrono::{DateTime, Utc};
use std::future::Future;
use tracing::{debug, info, warn};

use crate::{Candle, Series, Symbol, Timeframe};

/// Anything that can return one page of candles.
///
/// Implementations swallow request failures: an error is logged and an empty
/// page is returned, which ends the caller's loop early.
pub trait CandleSource {
    /// Largest page the source will serve
    fn max_page_size(&self) -> u32;

    /// Fetch up to `limit` candles starting at `since_ms` (epoch ms).
    /// `None` lets the source pick its default window.
    fn fetch_page(
        &self,
        symbol: &Symbol,
        timeframe: &Timeframe,
        since_ms: Option<i64>,
        limit: u32,
    ) -> impl Future<Output = Vec<Candle>> + Send;
}

/// Bounds of one chunked fetch
#[derive(Debug, Clone, Copy)]
pub struct FetchRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub page_size: u32,
    /// Upper bound on requests; reaching it is reported, not hidden
    pub max_pages: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub series: Series,
    pub pages: usize,
    /// The loop stopped because `max_pages` was reached
    pub hit_page_limit: bool,
}

/// Page through `source` from `range.start` until `range.end`.
///
/// Stops on an empty page, on a page shorter than the requested size, or on
/// a page reaching past `range.end` (rows after the end are trimmed). The
/// cursor advances to one millisecond after the last candle of each page.
pub async fn fetch_range<S: CandleSource>(
    source: &S,
    symbol: &Symbol,
    timeframe: &Timeframe,
    range: &FetchRange,
) -> FetchOutcome {
    let page_size = range.page_size.clamp(1, source.max_page_size().max(1));
    let end_ms = range.end.timestamp_millis();
    let mut cursor = range.start.timestamp_millis();

    let mut collected: Vec<Candle> = Vec::new();
    let mut pages = 0;
    let mut hit_page_limit = false;

    loop {
        if pages >= range.max_pages {
            warn!(
                "{} {}: stopped after {} pages (page limit) at cursor {}",
                symbol, timeframe, pages, cursor
            );
            hit_page_limit = true;
            break;
        }

        let page = source
            .fetch_page(symbol, timeframe, Some(cursor), page_size)
            .await;
        pages += 1;

        let Some(last_ms) = page.iter().map(Candle::timestamp_ms).max() else {
            debug!("{} {}: empty page at {}", symbol, timeframe, cursor);
            break;
        };
        let len = page.len();
        collected.extend(page);

        if last_ms >= end_ms {
            break;
        }
        if len < page_size as usize {
            break;
        }
        if last_ms < cursor {
            warn!(
                "{} {}: source returned no candle at or after cursor {}, stopping",
                symbol, timeframe, cursor
            );
            break;
        }
        cursor = last_ms + 1;
    }

    let mut series = Series::from_unsorted(collected);
    series.trim_after(range.end);

    info!(
        "Fetched {} candles for {} {} in {} pages",
        series.len(),
        symbol,
        timeframe,
        pages
    );

    FetchOutcome {
        series,
        pages,
        hit_page_limit,
    }
}

/// Single request for the `limit` most recent candles
pub async fn fetch_latest<S: CandleSource>(
    source: &S,
    symbol: &Symbol,
    timeframe: &Timeframe,
    limit: u32,
) -> Series {
    let limit = limit.clamp(1, source.max_page_size().max(1));
    Series::from_unsorted(source.fetch_page(symbol, timeframe, None, limit).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    /// Serves candles from a fixed minute grid, `max` per page
    struct GridSource {
        start: DateTime<Utc>,
        count: i64,
        max: u32,
        calls: Mutex<Vec<Option<i64>>>,
    }

    impl GridSource {
        fn new(count: i64, max: u32) -> Self {
            Self {
                start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                count,
                max,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn at(&self, i: i64) -> DateTime<Utc> {
            self.start + Duration::minutes(i)
        }
    }

    impl CandleSource for GridSource {
        fn max_page_size(&self) -> u32 {
            self.max
        }

        async fn fetch_page(
            &self,
            _symbol: &Symbol,
            _timeframe: &Timeframe,
            since_ms: Option<i64>,
            limit: u32,
        ) -> Vec<Candle> {
            self.calls.lock().unwrap().push(since_ms);
            let since = since_ms.unwrap_or(self.start.timestamp_millis());
            (0..self.count)
                .map(|i| self.at(i))
                .filter(|t| t.timestamp_millis() >= since)
                .take(limit as usize)
                .map(|t| Candle::new_unchecked(t, 1.0, 1.0, 1.0, 1.0, 1.0))
                .collect()
        }
    }

    fn symbol_tf() -> (Symbol, Timeframe) {
        (Symbol::new("BTC/USDT"), "1m".parse().unwrap())
    }

    #[tokio::test]
    async fn test_stops_on_short_page() {
        let source = GridSource::new(25, 10);
        let (sym, tf) = symbol_tf();
        let range = FetchRange {
            start: source.at(0),
            end: source.at(10_000),
            page_size: 10,
            max_pages: 100,
        };

        let out = fetch_range(&source, &sym, &tf, &range).await;
        assert_eq!(out.series.len(), 25);
        assert_eq!(out.pages, 3);
        assert!(!out.hit_page_limit);

        let calls = source.calls.lock().unwrap().clone();
        assert_eq!(calls[1], Some(source.at(9).timestamp_millis() + 1));
    }

    #[tokio::test]
    async fn test_trims_past_end() {
        let source = GridSource::new(100, 10);
        let (sym, tf) = symbol_tf();
        let range = FetchRange {
            start: source.at(0),
            end: source.at(14),
            page_size: 10,
            max_pages: 100,
        };

        let out = fetch_range(&source, &sym, &tf, &range).await;
        assert_eq!(out.series.len(), 15);
        assert_eq!(out.series.last_timestamp(), Some(source.at(14)));
        assert_eq!(out.pages, 2);
    }

    #[tokio::test]
    async fn test_page_limit_is_flagged() {
        let source = GridSource::new(1_000, 10);
        let (sym, tf) = symbol_tf();
        let range = FetchRange {
            start: source.at(0),
            end: source.at(999),
            page_size: 10,
            max_pages: 3,
        };

        let out = fetch_range(&source, &sym, &tf, &range).await;
        assert!(out.hit_page_limit);
        assert_eq!(out.pages, 3);
        assert_eq!(out.series.len(), 30);
    }

    #[tokio::test]
    async fn test_page_size_capped_by_source() {
        let source = GridSource::new(50, 20);
        let (sym, tf) = symbol_tf();
        let range = FetchRange {
            start: source.at(0),
            end: source.at(49),
            page_size: 5_000,
            max_pages: 100,
        };

        let out = fetch_range(&source, &sym, &tf, &range).await;
        assert_eq!(out.series.len(), 50);
        assert_eq!(out.pages, 3);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let source = GridSource::new(0, 10);
        let (sym, tf) = symbol_tf();
        let range = FetchRange {
            start: source.at(0),
            end: source.at(10),
            page_size: 10,
            max_pages: 100,
        };

        let out = fetch_range(&source, &sym, &tf, &range).await;
        assert!(out.series.is_empty());
        assert_eq!(out.pages, 1);
    }

    #[tokio::test]
    async fn test_fetch_latest_single_request() {
        let source = GridSource::new(50, 20);
        let (sym, tf) = symbol_tf();
        let series = fetch_latest(&source, &sym, &tf, 7).await;
        assert_eq!(series.len(), 7);
        assert_eq!(source.calls.lock().unwrap().as_slice(), &[None]);
    }
}
