//! On-disk layout and CSV persistence for candle series.
//!
//! Layout under the data root:
//!
//! ```text
//! crypto/<QUOTE>/<BASE>/crypto_<BASE>_<QUOTE>_<tf>.csv
//! crypto/<QUOTE>/<BASE>/manifest_<tf>.yaml
//! crypto/<QUOTE>/<BASE>/<tf>/<YYYY>/<MM>/crypto_<BASE>_<QUOTE>_<tf>.csv
//! crypto/<QUOTE>/<BASE>/<tf>/<YYYY>/<MM>/manifest_<tf>_<YYYY-MM>.yaml
//! crypto/<QUOTE>/<BASE>/<tf>/manifest_year_<YYYY>.yaml
//! ```
//!
//! Every write goes to a `.tmp` sibling first and is renamed into place.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{DataError, DataResult};
use crate::{Candle, Series, Symbol, Timeframe};

/// Datetime format used in partition files. Fractional seconds are written
/// only when non-zero (`%.f` prints nothing for whole seconds).
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Path builder for the partitioned data tree
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `crypto/<QUOTE>`
    pub fn quote_dir(&self, quote: &str) -> PathBuf {
        self.root.join("crypto").join(quote.to_uppercase())
    }

    /// `crypto/<QUOTE>/<BASE>`
    pub fn symbol_dir(&self, symbol: &Symbol) -> PathBuf {
        self.quote_dir(symbol.quote()).join(symbol.base())
    }

    fn file_stem(symbol: &Symbol, tf: &Timeframe) -> String {
        format!("crypto_{}_{}_{}", symbol.base(), symbol.quote(), tf)
    }

    /// Canonical (unpartitioned) series file
    pub fn series_path(&self, symbol: &Symbol, tf: &Timeframe) -> PathBuf {
        self.symbol_dir(symbol)
            .join(format!("{}.csv", Self::file_stem(symbol, tf)))
    }

    pub fn manifest_path(&self, symbol: &Symbol, tf: &Timeframe) -> PathBuf {
        self.symbol_dir(symbol).join(format!("manifest_{}.yaml", tf))
    }

    pub fn month_dir(&self, symbol: &Symbol, tf: &Timeframe, month: MonthKey) -> PathBuf {
        self.symbol_dir(symbol)
            .join(tf.to_string())
            .join(format!("{:04}", month.year))
            .join(format!("{:02}", month.month))
    }

    pub fn month_series_path(&self, symbol: &Symbol, tf: &Timeframe, month: MonthKey) -> PathBuf {
        self.month_dir(symbol, tf, month)
            .join(format!("{}.csv", Self::file_stem(symbol, tf)))
    }

    pub fn month_manifest_path(
        &self,
        symbol: &Symbol,
        tf: &Timeframe,
        month: MonthKey,
    ) -> PathBuf {
        self.month_dir(symbol, tf, month)
            .join(format!("manifest_{}_{}.yaml", tf, month))
    }

    pub fn year_manifest_path(&self, symbol: &Symbol, tf: &Timeframe, year: i32) -> PathBuf {
        self.symbol_dir(symbol)
            .join(tf.to_string())
            .join(format!("manifest_year_{:04}.yaml", year))
    }
}

/// Calendar month used as a partition key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Parse `YYYY-MM` or `YYYY-MM-DD`
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('-');
        let year = parts.next()?.parse().ok()?;
        let month = parts.next()?.parse().ok()?;
        Self::new(year, month)
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// =============================================================================
// Reading
// =============================================================================

/// Parse a partition datetime cell.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, the same with a `+00:00` offset,
/// and a bare `YYYY-MM-DD`.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT) {
        return Some(ndt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

fn parse_cell(cell: Option<&str>) -> f64 {
    match cell.map(str::trim) {
        None | Some("") => f64::NAN,
        Some(v) => v.parse().unwrap_or(f64::NAN),
    }
}

/// Load a series from a partition CSV.
///
/// A missing file is "no prior data" and yields `Ok(None)`. Empty or
/// non-numeric cells load as NaN. Extra columns (such as `symbol`) are ignored.
pub fn read_series(path: impl AsRef<Path>) -> DataResult<Option<Series>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;

    let mut candles = Vec::new();
    for result in reader.records() {
        let record = result?;
        let dt_str = record.get(0).unwrap_or_default();
        if dt_str.trim().is_empty() {
            continue;
        }
        let datetime = parse_datetime(dt_str).ok_or_else(|| DataError::InvalidTimestamp {
            path: path.to_path_buf(),
            value: dt_str.to_string(),
        })?;

        candles.push(Candle::new_unchecked(
            datetime,
            parse_cell(record.get(1)),
            parse_cell(record.get(2)),
            parse_cell(record.get(3)),
            parse_cell(record.get(4)),
            parse_cell(record.get(5)),
        ));
    }

    debug!("Read {} rows from {}", candles.len(), path.display());
    Ok(Some(Series::from_unsorted(candles)))
}

// =============================================================================
// Writing
// =============================================================================

fn format_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

/// Serialize a series to partition CSV bytes with a trailing `symbol` column
pub fn series_to_csv(series: &Series, symbol: &Symbol) -> DataResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["datetime", "open", "high", "low", "close", "volume", "symbol"])?;

    for candle in series {
        writer.write_record([
            candle.datetime.format(DATETIME_FORMAT).to_string(),
            format_value(candle.open),
            format_value(candle.high),
            format_value(candle.low),
            format_value(candle.close),
            format_value(candle.volume),
            symbol.to_string(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| DataError::io(PathBuf::new(), e.into_error()))
}

/// Write bytes to `path` through a `.tmp` sibling and an atomic rename
pub fn write_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> DataResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, bytes).map_err(|e| DataError::io(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::io(path, e)
    })
}

/// Write a series atomically and return the bytes written (for checksums)
pub fn write_series(
    path: impl AsRef<Path>,
    series: &Series,
    symbol: &Symbol,
) -> DataResult<Vec<u8>> {
    let path = path.as_ref();
    let bytes = series_to_csv(series, symbol)?;
    write_atomic(path, &bytes)?;
    debug!("Wrote {} rows to {}", series.len(), path.display());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_layout_paths() {
        let layout = DataLayout::new("data");
        let btc = Symbol::new("BTC/USDT");
        let tf: Timeframe = "1m".parse().unwrap();
        let month = MonthKey::new(2024, 2).unwrap();

        assert_eq!(
            layout.series_path(&btc, &tf),
            PathBuf::from("data/crypto/USDT/BTC/crypto_BTC_USDT_1m.csv")
        );
        assert_eq!(
            layout.manifest_path(&btc, &tf),
            PathBuf::from("data/crypto/USDT/BTC/manifest_1m.yaml")
        );
        assert_eq!(
            layout.month_series_path(&btc, &tf, month),
            PathBuf::from("data/crypto/USDT/BTC/1m/2024/02/crypto_BTC_USDT_1m.csv")
        );
        assert_eq!(
            layout.month_manifest_path(&btc, &tf, month),
            PathBuf::from("data/crypto/USDT/BTC/1m/2024/02/manifest_1m_2024-02.yaml")
        );
        assert_eq!(
            layout.year_manifest_path(&btc, &tf, 2024),
            PathBuf::from("data/crypto/USDT/BTC/1m/manifest_year_2024.yaml")
        );
    }

    #[test]
    fn test_month_key() {
        assert_eq!(MonthKey::parse("2024-01"), MonthKey::new(2024, 1));
        assert_eq!(MonthKey::parse("2024-03-15"), MonthKey::new(2024, 3));
        assert_eq!(MonthKey::parse("2024-13"), None);
        assert_eq!(MonthKey::parse("2024"), None);
        assert_eq!(MonthKey::new(2024, 7).unwrap().to_string(), "2024-07");
    }

    #[test]
    fn test_parse_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_datetime("2024-06-01 12:30:00"), Some(expected));
        assert_eq!(parse_datetime("2024-06-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_datetime("2024-06-01 12:30:00+00:00"), Some(expected));
        assert_eq!(
            parse_datetime("2024-06-01"),
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/series.csv");
        let symbol = Symbol::new("ETH/USDT");
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let series = Series::from_unsorted(vec![
            Candle::new_unchecked(t, 1.5, 2.0, 1.0, 1.75, 100.0),
            Candle::new_unchecked(t + chrono::Duration::hours(1), 1.75, 2.5, 1.5, f64::NAN, 0.0),
        ]);

        let bytes = write_series(&path, &series, &symbol).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("datetime,open,high,low,close,volume,symbol\n"));
        assert!(text.contains("2024-01-01 00:00:00,1.5,2,1,1.75,100,ETH/USDT"));
        assert!(!path.with_file_name("series.csv.tmp").exists());

        let loaded = read_series(&path).unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.candles()[0], series.candles()[0]);
        assert!(loaded.candles()[1].close.is_nan());
    }

    #[test]
    fn test_sub_second_timestamps_survive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.csv");
        let symbol = Symbol::new("BTC/USDT");
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let series = Series::from_unsorted(vec![
            Candle::new_unchecked(t, 1.0, 1.0, 1.0, 1.0, 1.0),
            Candle::new_unchecked(t + chrono::Duration::milliseconds(250), 2.0, 2.0, 2.0, 2.0, 2.0),
            Candle::new_unchecked(t + chrono::Duration::microseconds(250_001), 3.0, 3.0, 3.0, 3.0, 3.0),
        ]);

        let text = String::from_utf8(write_series(&path, &series, &symbol).unwrap()).unwrap();
        assert!(text.contains("2024-01-01 00:00:00,1,"));
        assert!(text.contains("2024-01-01 00:00:00.250,2,"));
        assert!(text.contains("2024-01-01 00:00:00.250001,3,"));

        let loaded = read_series(&path).unwrap().unwrap();
        assert_eq!(loaded, series);
        assert_eq!(
            parse_datetime("2024-01-01 00:00:00.250+00:00"),
            Some(t + chrono::Duration::milliseconds(250))
        );
    }

    #[test]
    fn test_read_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_series(dir.path().join("absent.csv")).unwrap().is_none());
    }
}
