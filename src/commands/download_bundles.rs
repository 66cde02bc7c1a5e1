//! Download-bundles command: fetch Binance public kline archives

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use crypto_data::binance::bundles::{plan_downloads, DEFAULT_BUNDLE_PAIRS};
use crypto_data::binance::{BundleDownloader, BundlePeriod};
use crypto_data::Config;
use std::path::PathBuf;
use tracing::info;

use super::{parse_symbols, parse_timeframe};

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Bad date {:?}", s))
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    config: &Config,
    symbols: Vec<String>,
    timeframe: String,
    period: String,
    days_back: u32,
    start_date: Option<String>,
    end_date: Option<String>,
    bundle_dir: Option<PathBuf>,
    dry_run: bool,
    force: bool,
) -> Result<()> {
    let tf = parse_timeframe(&timeframe)?;
    let period: BundlePeriod = period.parse()?;
    let bundle_dir = bundle_dir.unwrap_or_else(|| config.bundles.dir.clone());

    let pairs: Vec<String> = if symbols.is_empty() {
        DEFAULT_BUNDLE_PAIRS.iter().map(|s| s.to_string()).collect()
    } else {
        parse_symbols(&symbols, &config.quote)?
            .iter()
            .map(|s| s.exchange_pair())
            .collect()
    };

    // Bundles are published the day after, so default to yesterday
    let end = match end_date {
        Some(s) => parse_date(&s)?,
        None => Utc::now().date_naive() - Duration::days(1),
    };
    let start = match start_date {
        Some(s) => parse_date(&s)?,
        None => end - Duration::days(days_back.saturating_sub(1) as i64),
    };
    if start > end {
        anyhow::bail!("Start date {} is after end date {}", start, end);
    }

    let plan = plan_downloads(
        &config.bundles.base_url,
        &bundle_dir,
        &pairs,
        &tf,
        period,
        start,
        end,
    );
    info!(
        "{} {} bundles planned for {} pair(s), {} -> {}",
        plan.len(),
        period,
        pairs.len(),
        start,
        end
    );

    let rt = tokio::runtime::Runtime::new()?;
    let downloader = BundleDownloader::new(&config.bundles, &config.exchange)?;
    let summary = rt.block_on(downloader.download_all(&plan, force, dry_run));

    println!(
        "Bundles: {} downloaded, {} skipped, {} failed (of {}){}",
        summary.downloaded,
        summary.skipped,
        summary.failed,
        summary.planned,
        if dry_run { " [dry-run]" } else { "" }
    );
    Ok(())
}
