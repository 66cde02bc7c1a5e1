//! Fetch-and-store orchestration for canonical series.
//!
//! Resume planning, chunked fetching, merge-and-dedup and manifest
//! regeneration for one (symbol, timeframe) at a time.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::fetch::{fetch_range, CandleSource, FetchRange};
use crate::manifest::{self, ManifestOptions};
use crate::merge::{merge_series, MergeReport};
use crate::planner::plan_update;
use crate::storage::{self, DataLayout};
use crate::{Series, Symbol, Timeframe};

/// Knobs for an incremental update
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    pub overlap: u32,
    pub lookback: Duration,
    pub include_now: bool,
    pub page_size: u32,
    pub max_pages: usize,
}

/// Result of merging fetched candles into a stored series
#[derive(Debug, Clone)]
pub struct StoreOutcome {
    pub path: PathBuf,
    pub merge: MergeReport,
    /// `false` when nothing was fetched and the file was left untouched
    pub written: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateSummary {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub since: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resumed: bool,
    pub fetched: usize,
    pub pages: usize,
    pub hit_page_limit: bool,
    pub store: StoreOutcome,
}

/// Merge `incoming` into the canonical series file (new wins), write it
/// atomically and regenerate its manifest
pub fn store_series(
    layout: &DataLayout,
    symbol: &Symbol,
    timeframe: &Timeframe,
    incoming: &Series,
    now: DateTime<Utc>,
) -> Result<StoreOutcome> {
    let path = layout.series_path(symbol, timeframe);
    let existing = storage::read_series(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if incoming.is_empty() {
        let rows = existing.as_ref().map_or(0, Series::len);
        return Ok(StoreOutcome {
            path,
            merge: MergeReport {
                existing: rows,
                rows,
                ..MergeReport::default()
            },
            written: false,
        });
    }

    let existing = existing.unwrap_or_default();
    let (merged, report) = merge_series(&existing, incoming);

    storage::write_series(&path, &merged, symbol)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let options = ManifestOptions {
        updated: Some(now),
        last_close: true,
        ..ManifestOptions::default()
    };
    let m = manifest::synthesize(&merged, symbol, timeframe, &options);
    manifest::write_manifest(layout.manifest_path(symbol, timeframe), &m)
        .context("Failed to write manifest")?;

    info!(
        "Saved {} rows to {} ({} new, {} replaced)",
        report.rows,
        path.display(),
        report.added,
        report.replaced
    );

    Ok(StoreOutcome {
        path,
        merge: report,
        written: true,
    })
}

/// Bring the stored series for `symbol` up to date.
///
/// Resumes `overlap` bars before the last stored candle (or `lookback`
/// before `now` on a cold start) and fetches up to `now` or the end of
/// yesterday.
pub async fn update_symbol<S: CandleSource>(
    source: &S,
    layout: &DataLayout,
    symbol: &Symbol,
    timeframe: &Timeframe,
    options: &UpdateOptions,
    now: DateTime<Utc>,
) -> Result<UpdateSummary> {
    let path = layout.series_path(symbol, timeframe);
    let last_stored = storage::read_series(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?
        .and_then(|s| s.last_timestamp());

    let plan = plan_update(
        last_stored,
        timeframe,
        options.overlap,
        options.lookback,
        options.include_now,
        now,
    )
    .with_context(|| format!("Cannot plan update for {} {}", symbol, timeframe))?;

    info!(
        "{} {}: fetching {} -> {} ({})",
        symbol,
        timeframe,
        plan.since,
        plan.end,
        if plan.resumed { "resume" } else { "cold start" }
    );

    let (series, pages, hit_page_limit) = if plan.since > plan.end {
        info!("{} {}: already up to date", symbol, timeframe);
        (Series::new(), 0, false)
    } else {
        let range = FetchRange {
            start: plan.since,
            end: plan.end,
            page_size: options.page_size,
            max_pages: options.max_pages,
        };
        let outcome = fetch_range(source, symbol, timeframe, &range).await;
        (outcome.series, outcome.pages, outcome.hit_page_limit)
    };

    if series.is_empty() {
        warn!("{} {}: no candles fetched", symbol, timeframe);
    }

    let store = store_series(layout, symbol, timeframe, &series, now)?;

    Ok(UpdateSummary {
        symbol: symbol.clone(),
        timeframe: *timeframe,
        since: plan.since,
        end: plan.end,
        resumed: plan.resumed,
        fetched: series.len(),
        pages,
        hit_page_limit,
        store,
    })
}
