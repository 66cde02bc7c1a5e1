//! Import of pre-downloaded Binance kline bundles into month partitions.
//!
//! Bundles are named `<SYM>-<tf>-<YYYY-MM[-DD]>.{csv,zip}` and hold raw,
//! header-less kline rows whose first six columns are
//! `open_time, open, high, low, close, volume`. The open time may be in
//! seconds, milliseconds or microseconds.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::read::ZipArchive;

use crate::error::{DataError, DataResult};
use crate::partition;
use crate::storage::{DataLayout, MonthKey};
use crate::{Candle, Series, Symbol, Timeframe};

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}(?:-\d{2})?)").expect("valid date regex"));

// =============================================================================
// Epoch unit detection
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochUnit {
    Seconds,
    Millis,
    Micros,
}

/// Guess the unit of a column of epoch values from its largest magnitude
pub fn detect_unit(max_abs: i64) -> EpochUnit {
    if max_abs > 100_000_000_000_000 {
        EpochUnit::Micros
    } else if max_abs > 100_000_000_000 {
        EpochUnit::Millis
    } else {
        EpochUnit::Seconds
    }
}

impl EpochUnit {
    pub fn to_datetime(self, value: i64) -> Option<DateTime<Utc>> {
        match self {
            EpochUnit::Seconds => DateTime::from_timestamp(value, 0),
            EpochUnit::Millis => DateTime::from_timestamp_millis(value),
            EpochUnit::Micros => DateTime::from_timestamp_micros(value),
        }
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// A bundle file on disk matched to a symbol and month
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFile {
    pub path: PathBuf,
    /// Date part of the filename, `YYYY-MM` or `YYYY-MM-DD`
    pub date_label: String,
    pub month: MonthKey,
}

impl BundleFile {
    /// Monthly bundles carry a `YYYY-MM` label
    pub fn is_monthly(&self) -> bool {
        self.date_label.len() == 7
    }
}

/// Month (and raw date label) embedded in a bundle filename
pub fn month_from_filename(name: &str) -> Option<(MonthKey, String)> {
    let label = DATE_RE.captures(name)?.get(1)?.as_str().to_string();
    MonthKey::parse(&label).map(|m| (m, label))
}

fn is_bundle_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()),
        Some(ref e) if e == "csv" || e == "zip"
    )
}

/// `true` when `name` is `<SYM>-<tf>-...` with SYM equal to the pair or the base
fn name_matches(name: &str, symbol: &Symbol, timeframe: &Timeframe) -> bool {
    let Some((sym, rest)) = name.split_once('-') else {
        return false;
    };
    let sym = sym.to_ascii_uppercase();
    let sym_ok = sym == symbol.exchange_pair() || sym == symbol.base();
    sym_ok && rest.starts_with(&format!("{}-", timeframe))
}

/// Recursively find bundles for `symbol`/`timeframe`, sorted by path.
/// Returns the dated files and the number of matching files without a date.
pub fn find_bundle_files(
    bundle_dir: &Path,
    symbol: &Symbol,
    timeframe: &Timeframe,
) -> (Vec<BundleFile>, usize) {
    let mut files = Vec::new();
    let mut undated = 0;

    let entries = WalkDir::new(bundle_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_bundle_extension(e.path()));

    for entry in entries {
        let name = entry.file_name().to_string_lossy();
        if !name_matches(&name, symbol, timeframe) {
            continue;
        }
        match month_from_filename(&name) {
            Some((month, date_label)) => files.push(BundleFile {
                path: entry.path().to_path_buf(),
                date_label,
                month,
            }),
            None => {
                warn!("Skipping bundle without a date in its name: {}", entry.path().display());
                undated += 1;
            }
        }
    }

    files.sort_by(|a, b| (&a.date_label, &a.path).cmp(&(&b.date_label, &b.path)));
    (files, undated)
}

/// Exchange pairs present in a bundle directory for `timeframe`
pub fn discover_pairs(bundle_dir: &Path, timeframe: &Timeframe) -> Vec<String> {
    let marker = format!("-{}-", timeframe);
    let pairs: BTreeSet<String> = WalkDir::new(bundle_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_bundle_extension(e.path()))
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let idx = name.find(&marker)?;
            let sym = &name[..idx];
            (!sym.is_empty() && !sym.contains('-')).then(|| sym.to_ascii_uppercase())
        })
        .collect();
    pairs.into_iter().collect()
}

// =============================================================================
// Decoding
// =============================================================================

fn read_bundle_text(path: &Path) -> DataResult<Vec<String>> {
    let is_zip = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"));

    if !is_zip {
        let text = fs::read_to_string(path).map_err(|e| DataError::io(path, e))?;
        return Ok(vec![text]);
    }

    let file = fs::File::open(path).map_err(|e| DataError::io(path, e))?;
    let mut archive = ZipArchive::new(file)?;
    let mut texts = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if !entry.name().to_ascii_lowercase().ends_with(".csv") {
            continue;
        }
        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .map_err(|e| DataError::io(path, e))?;
        texts.push(text);
    }

    if texts.is_empty() {
        return Err(DataError::malformed(path, "archive contains no .csv entries"));
    }
    Ok(texts)
}

fn parse_open_time(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    cell.parse::<i64>().ok().or_else(|| {
        cell.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v as i64)
    })
}

fn parse_price(cell: &str) -> f64 {
    cell.trim().parse().unwrap_or(f64::NAN)
}

/// Decode one bundle (CSV or ZIP of CSVs) into a series.
///
/// Rows whose open time is not numeric (header lines) are dropped. Rows with
/// fewer than six columns make the whole file malformed.
pub fn decode_bundle(path: &Path) -> DataResult<Series> {
    let mut raw: Vec<(i64, [f64; 5])> = Vec::new();

    for text in read_bundle_text(path)? {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        for result in reader.records() {
            let record = result?;
            if record.len() < 6 {
                return Err(DataError::malformed(
                    path,
                    format!("expected at least 6 columns, found {}", record.len()),
                ));
            }
            let Some(open_time) = parse_open_time(&record[0]) else {
                continue;
            };
            raw.push((
                open_time,
                [
                    parse_price(&record[1]),
                    parse_price(&record[2]),
                    parse_price(&record[3]),
                    parse_price(&record[4]),
                    parse_price(&record[5]),
                ],
            ));
        }
    }

    let Some(max_abs) = raw.iter().map(|(t, _)| t.unsigned_abs()).max() else {
        return Ok(Series::new());
    };
    let unit = detect_unit(i64::try_from(max_abs).unwrap_or(i64::MAX));
    debug!("{}: {} rows, open time in {:?}", path.display(), raw.len(), unit);

    let total = raw.len();
    let candles: Vec<Candle> = raw
        .into_iter()
        .filter_map(|(t, [o, h, l, c, v])| {
            let datetime = unit.to_datetime(t)?;
            Some(Candle::new_unchecked(datetime, o, h, l, c, v))
        })
        .collect();

    let out_of_range = total - candles.len();
    if out_of_range > 0 {
        warn!(
            "Dropped {} row(s) with out-of-range open time in {}",
            out_of_range,
            path.display()
        );
    }
    Ok(Series::from_unsorted(candles))
}

// =============================================================================
// Import
// =============================================================================

pub use crate::partition::{ImportOptions, ImportSummary, MonthImport};

/// Pick the files feeding one month: the monthly bundle when present,
/// otherwise every daily bundle in date order
fn month_sources(files: &[BundleFile]) -> Vec<&BundleFile> {
    match files.iter().filter(|f| f.is_monthly()).last() {
        Some(monthly) => vec![monthly],
        None => files.iter().collect(),
    }
}

/// Import every bundle for `symbol`/`timeframe` found under `bundle_dir`
pub fn import_symbol(
    layout: &DataLayout,
    bundle_dir: &Path,
    symbol: &Symbol,
    timeframe: &Timeframe,
    options: ImportOptions,
    now: DateTime<Utc>,
) -> DataResult<ImportSummary> {
    let (files, undated) = find_bundle_files(bundle_dir, symbol, timeframe);
    let mut summary = ImportSummary {
        files_skipped: undated,
        ..ImportSummary::default()
    };

    if files.is_empty() {
        info!("No bundles for {} {} in {}", symbol, timeframe, bundle_dir.display());
        return Ok(summary);
    }

    let by_month: BTreeMap<MonthKey, Vec<BundleFile>> = files
        .into_iter()
        .into_group_map_by(|f| f.month)
        .into_iter()
        .collect();

    let mut decoded = Vec::with_capacity(by_month.len());
    for (month, month_files) in &by_month {
        let mut candles: Vec<Candle> = Vec::new();
        let mut used = 0;

        for file in month_sources(month_files) {
            match decode_bundle(&file.path) {
                Ok(series) => {
                    candles.extend(series.into_candles());
                    used += 1;
                }
                Err(e) => {
                    warn!("Skipping unreadable bundle {}: {}", file.path.display(), e);
                    summary.files_skipped += 1;
                }
            }
        }
        summary.files_read += used;

        if used > 0 {
            decoded.push((*month, Series::from_unsorted(candles), used));
        }
    }

    partition::store_months(layout, symbol, timeframe, decoded, options, now, &mut summary)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_unit() {
        assert_eq!(detect_unit(1_700_000_000_000_000), EpochUnit::Micros);
        assert_eq!(detect_unit(1_700_000_000_000), EpochUnit::Millis);
        assert_eq!(detect_unit(1_700_000_000), EpochUnit::Seconds);
        assert_eq!(detect_unit(0), EpochUnit::Seconds);
    }

    #[test]
    fn test_units_decode_to_same_instant() {
        let s = EpochUnit::Seconds.to_datetime(1_700_000_000).unwrap();
        assert_eq!(EpochUnit::Millis.to_datetime(1_700_000_000_000), Some(s));
        assert_eq!(EpochUnit::Micros.to_datetime(1_700_000_000_000_000), Some(s));
    }

    #[test]
    fn test_month_from_filename() {
        let (m, label) = month_from_filename("BTCUSDT-1m-2024-02-15.zip").unwrap();
        assert_eq!(m, MonthKey::new(2024, 2).unwrap());
        assert_eq!(label, "2024-02-15");

        let (m, label) = month_from_filename("BTCUSDT-1m-2023-12.csv").unwrap();
        assert_eq!(m, MonthKey::new(2023, 12).unwrap());
        assert_eq!(label, "2023-12");

        assert!(month_from_filename("BTCUSDT-1m-latest.csv").is_none());
    }

    #[test]
    fn test_name_matching_rejects_other_symbols() {
        let btc = Symbol::new("BTC/USDT");
        let tf: Timeframe = "1m".parse().unwrap();
        assert!(name_matches("BTCUSDT-1m-2024-01.zip", &btc, &tf));
        assert!(name_matches("BTC-1m-2024-01.csv", &btc, &tf));
        assert!(!name_matches("WBTCUSDT-1m-2024-01.zip", &btc, &tf));
        assert!(!name_matches("BTCUSDT-1M-2024-01.zip", &btc, &tf));
        assert!(!name_matches("BTCUSDT-15m-2024-01.zip", &btc, &tf));
    }

    #[test]
    fn test_decode_csv_drops_header_and_detects_millis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BTCUSDT-1m-2024-01-01.csv");
        fs::write(
            &path,
            "open_time,open,high,low,close,volume,close_time\n\
             1704067260000,2,3,1,2.5,10,0\n\
             1704067200000,1,2,0.5,1.5,5,0\n\
             1704067260000,2,3,1,2.75,11,0\n",
        )
        .unwrap();

        let series = decode_bundle(&path).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.candles()[0].timestamp_ms(), 1_704_067_200_000);
        assert_eq!(series.candles()[1].close, 2.75);
    }

    #[test]
    fn test_decode_zip_concatenates_csv_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BTCUSDT-1m-2024-01.zip");

        let file = fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let opts = zip::write::SimpleFileOptions::default();
        zip.start_file("part1.csv", opts).unwrap();
        zip.write_all(b"1704067200000000,1,2,0.5,1.5,5\n").unwrap();
        zip.start_file("readme.txt", opts).unwrap();
        zip.write_all(b"ignored").unwrap();
        zip.start_file("part2.csv", opts).unwrap();
        zip.write_all(b"1704067260000000,2,3,1,2.5,10\n").unwrap();
        zip.finish().unwrap();

        let series = decode_bundle(&path).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.candles()[1].timestamp_ms(), 1_704_067_260_000);
    }

    #[test]
    fn test_decode_drops_out_of_range_open_times() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BTCUSDT-1m-2024-01-01.csv");
        fs::write(
            &path,
            "1704067200000000,1,2,0.5,1.5,5\n\
             9223372036854775807,2,3,1,2.5,10\n",
        )
        .unwrap();

        let series = decode_bundle(&path).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.candles()[0].timestamp_ms(), 1_704_067_200_000);
    }

    #[test]
    fn test_decode_rejects_narrow_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BTCUSDT-1m-2024-01-01.csv");
        fs::write(&path, "1704067200000,1,2,0.5\n").unwrap();
        assert!(matches!(
            decode_bundle(&path),
            Err(DataError::MalformedBundle { .. })
        ));
    }

    #[test]
    fn test_monthly_bundle_preferred_over_daily() {
        let m = MonthKey::new(2024, 1).unwrap();
        let daily = BundleFile {
            path: PathBuf::from("a/BTCUSDT-1m-2024-01-01.zip"),
            date_label: "2024-01-01".into(),
            month: m,
        };
        let monthly = BundleFile {
            path: PathBuf::from("b/BTCUSDT-1m-2024-01.zip"),
            date_label: "2024-01".into(),
            month: m,
        };
        let files = vec![daily.clone(), monthly.clone()];
        assert_eq!(month_sources(&files), vec![&monthly]);
        assert_eq!(month_sources(&[daily.clone()]), vec![&daily]);
    }

    #[test]
    fn test_discover_pairs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("1m")).unwrap();
        for name in [
            "1m/BTCUSDT-1m-2024-01-01.zip",
            "1m/ETHUSDT-1m-2024-01-01.zip",
            "1m/BTCUSDT-1m-2024-01-02.zip",
            "1m/SOLUSDT-1h-2024-01-02.zip",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let tf: Timeframe = "1m".parse().unwrap();
        assert_eq!(discover_pairs(dir.path(), &tf), vec!["BTCUSDT", "ETHUSDT"]);
    }
}
