//! Month partitions and their yearly roll-ups.
//!
//! Both the bundle importer and the canonical-series splitter route candles
//! through [`store_month`] and finish with [`write_rollups`], so partitions
//! written either way look the same on disk.

use chrono::{DateTime, Datelike, Utc};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::DataResult;
use crate::manifest::{self, ManifestOptions, MonthEntry};
use crate::merge::merge_series;
use crate::storage::{self, DataLayout, MonthKey};
use crate::{Series, Symbol, Timeframe};

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Decode and merge in memory, write nothing
    pub dry_run: bool,
    /// Ignore existing partitions instead of merging into them
    pub force: bool,
}

/// Outcome for one month partition
#[derive(Debug, Clone, PartialEq)]
pub struct MonthImport {
    pub month: MonthKey,
    pub files: usize,
    pub rows: usize,
    pub added: usize,
    pub replaced: usize,
    pub sha256: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    pub months: Vec<MonthImport>,
    /// Months that could not be merged or written; the rest still went through
    pub months_failed: usize,
    pub files_read: usize,
    pub files_skipped: usize,
    /// Row totals of the yearly roll-ups after this import
    pub year_rows: BTreeMap<i32, usize>,
}

/// Month a candle belongs to
pub fn month_of(t: DateTime<Utc>) -> MonthKey {
    MonthKey {
        year: t.year(),
        month: t.month(),
    }
}

/// Split a series into per-month series, in month order
pub fn split_by_month(series: &Series) -> BTreeMap<MonthKey, Series> {
    series
        .iter()
        .cloned()
        .into_group_map_by(|c| month_of(c.datetime))
        .into_iter()
        .map(|(month, candles)| (month, Series::from_unsorted(candles)))
        .collect()
}

/// Merge `incoming` into one month partition, write it and its manifest.
///
/// With `dry_run` the merge happens in memory only.
#[allow(clippy::too_many_arguments)]
pub fn store_month(
    layout: &DataLayout,
    symbol: &Symbol,
    timeframe: &Timeframe,
    month: MonthKey,
    incoming: &Series,
    files: usize,
    options: ImportOptions,
    now: DateTime<Utc>,
) -> DataResult<(MonthImport, MonthEntry)> {
    let path = layout.month_series_path(symbol, timeframe, month);
    let existing = if options.force {
        Series::new()
    } else {
        storage::read_series(&path)?.unwrap_or_default()
    };
    let (merged, report) = merge_series(&existing, incoming);

    let bytes = if options.dry_run {
        storage::series_to_csv(&merged, symbol)?
    } else {
        storage::write_series(&path, &merged, symbol)?
    };

    let partition = manifest::synthesize(
        &merged,
        symbol,
        timeframe,
        &ManifestOptions::partition(bytes, now),
    );
    if !options.dry_run {
        manifest::write_manifest(layout.month_manifest_path(symbol, timeframe, month), &partition)?;
    }

    info!(
        "{} {} {}: {} rows ({} new, {} replaced) from {} file(s){}",
        symbol,
        timeframe,
        month,
        report.rows,
        report.added,
        report.replaced,
        files,
        if options.dry_run { " [dry-run]" } else { "" }
    );

    let entry = MonthEntry::from_manifest(&partition);
    Ok((
        MonthImport {
            month,
            files,
            rows: report.rows,
            added: report.added,
            replaced: report.replaced,
            sha256: partition.sha256.unwrap_or_default(),
            path,
        },
        entry,
    ))
}

/// Record `written` months in their yearly roll-ups; returns rows per year.
/// `written` must be in month order.
pub fn write_rollups(
    layout: &DataLayout,
    symbol: &Symbol,
    timeframe: &Timeframe,
    written: Vec<(MonthKey, MonthEntry)>,
    dry_run: bool,
    now: DateTime<Utc>,
) -> DataResult<BTreeMap<i32, usize>> {
    let mut year_rows = BTreeMap::new();
    for (year, entries) in &written.into_iter().chunk_by(|(m, _)| m.year) {
        let entries: Vec<(MonthKey, MonthEntry)> = entries.collect();
        let rows = if dry_run {
            entries.iter().map(|(_, e)| e.rows).sum()
        } else {
            manifest::update_year_manifest(
                layout.year_manifest_path(symbol, timeframe, year),
                year,
                &entries,
                now,
            )?
            .rows
        };
        year_rows.insert(year, rows);
    }
    Ok(year_rows)
}

/// Store every month of `months` and write the roll-ups.
///
/// A month that fails is logged and counted in `months_failed`; the others
/// are still written and recorded.
pub(crate) fn store_months(
    layout: &DataLayout,
    symbol: &Symbol,
    timeframe: &Timeframe,
    months: impl IntoIterator<Item = (MonthKey, Series, usize)>,
    options: ImportOptions,
    now: DateTime<Utc>,
    summary: &mut ImportSummary,
) -> DataResult<()> {
    let mut written = Vec::new();

    for (month, incoming, files) in months {
        match store_month(layout, symbol, timeframe, month, &incoming, files, options, now) {
            Ok((import, entry)) => {
                summary.months.push(import);
                written.push((month, entry));
            }
            Err(e) => {
                warn!("Failed to import {} {} {}: {}", symbol, timeframe, month, e);
                summary.months_failed += 1;
            }
        }
    }

    summary.year_rows = write_rollups(layout, symbol, timeframe, written, options.dry_run, now)?;
    Ok(())
}

/// Split the canonical series of `symbol` into month partitions.
///
/// Returns an empty summary when there is no canonical file.
pub fn partition_symbol(
    layout: &DataLayout,
    symbol: &Symbol,
    timeframe: &Timeframe,
    options: ImportOptions,
    now: DateTime<Utc>,
) -> DataResult<ImportSummary> {
    let mut summary = ImportSummary::default();
    let source = layout.series_path(symbol, timeframe);
    let Some(series) = storage::read_series(&source)? else {
        info!("No canonical {} series for {} at {}", timeframe, symbol, source.display());
        return Ok(summary);
    };
    summary.files_read = 1;

    let months = split_by_month(&series)
        .into_iter()
        .map(|(month, part)| (month, part, 1));
    store_months(layout, symbol, timeframe, months, options, now, &mut summary)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;
    use chrono::{Duration, TimeZone};

    fn hourly(start: DateTime<Utc>, count: i64) -> Series {
        (0..count)
            .map(|i| Candle::new_unchecked(start + Duration::hours(i), 1.0, 2.0, 0.5, 1.5, 10.0))
            .collect()
    }

    #[test]
    fn test_split_by_month() {
        let start = Utc.with_ymd_and_hms(2023, 12, 31, 20, 0, 0).unwrap();
        let parts = split_by_month(&hourly(start, 10));
        let keys: Vec<String> = parts.keys().map(|m| m.to_string()).collect();
        assert_eq!(keys, vec!["2023-12", "2024-01"]);
        assert_eq!(parts[&MonthKey::new(2023, 12).unwrap()].len(), 4);
        assert_eq!(parts[&MonthKey::new(2024, 1).unwrap()].len(), 6);
    }

    #[test]
    fn test_partition_symbol_writes_months_and_rollup() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        let btc = Symbol::new("BTC/USDT");
        let tf: Timeframe = "1h".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        // 2024-01-31 00:00 .. 2024-02-01 23:00
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        storage::write_series(layout.series_path(&btc, &tf), &hourly(start, 48), &btc).unwrap();

        let summary = partition_symbol(&layout, &btc, &tf, ImportOptions::default(), now).unwrap();
        assert_eq!(summary.months.len(), 2);
        assert_eq!(summary.months_failed, 0);
        assert_eq!(summary.year_rows.get(&2024), Some(&48));

        for month in [MonthKey::new(2024, 1).unwrap(), MonthKey::new(2024, 2).unwrap()] {
            let part = storage::read_series(layout.month_series_path(&btc, &tf, month))
                .unwrap()
                .unwrap();
            assert_eq!(part.len(), 24);
            assert!(layout.month_manifest_path(&btc, &tf, month).exists());
        }
        assert!(layout.year_manifest_path(&btc, &tf, 2024).exists());
    }

    #[test]
    fn test_partition_dry_run_and_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        let btc = Symbol::new("BTC/USDT");
        let tf: Timeframe = "1h".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        let empty = partition_symbol(&layout, &btc, &tf, ImportOptions::default(), now).unwrap();
        assert_eq!(empty, ImportSummary::default());

        let start = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        storage::write_series(layout.series_path(&btc, &tf), &hourly(start, 48), &btc).unwrap();
        let options = ImportOptions {
            dry_run: true,
            force: false,
        };
        let summary = partition_symbol(&layout, &btc, &tf, options, now).unwrap();
        assert_eq!(summary.year_rows.get(&2024), Some(&48));
        assert!(!layout.month_dir(&btc, &tf, MonthKey::new(2024, 1).unwrap()).exists());
        assert!(!layout.year_manifest_path(&btc, &tf, 2024).exists());
    }
}
