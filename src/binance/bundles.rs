//! Downloader for Binance public kline bundles (data.binance.vision).
//!
//! Remote layout:
//! ```text
//! {base}/{daily|monthly}/klines/{PAIR}/{tf}/{PAIR}-{tf}-{date}.zip
//! ```
//! Daily bundles land in `<bundle_dir>/<tf>/`, monthly ones in
//! `<bundle_dir>/monthly_<tf>/`.

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate};
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::common::RateLimiter;
use crate::config::{BundleConfig, ExchangeConfig};
use crate::storage::write_atomic;
use crate::Timeframe;

/// Symbols downloaded when none are given
pub const DEFAULT_BUNDLE_PAIRS: &[&str] = &["BTCUSDT", "ETHUSDT", "BNBUSDT", "XRPUSDT", "ADAUSDT"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundlePeriod {
    Daily,
    Monthly,
}

impl BundlePeriod {
    fn remote_segment(self) -> &'static str {
        match self {
            BundlePeriod::Daily => "daily",
            BundlePeriod::Monthly => "monthly",
        }
    }

    /// Local directory a bundle of this period is stored under
    pub fn local_dir(self, bundle_dir: &Path, timeframe: &Timeframe) -> PathBuf {
        match self {
            BundlePeriod::Daily => bundle_dir.join(timeframe.to_string()),
            BundlePeriod::Monthly => bundle_dir.join(format!("monthly_{}", timeframe)),
        }
    }
}

impl FromStr for BundlePeriod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(BundlePeriod::Daily),
            "monthly" => Ok(BundlePeriod::Monthly),
            other => anyhow::bail!("unknown bundle period {:?} (expected daily or monthly)", other),
        }
    }
}

impl fmt::Display for BundlePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.remote_segment())
    }
}

/// One planned bundle download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDownload {
    pub url: String,
    pub dest: PathBuf,
}

/// Date labels covered by `[start, end]`: each day, or each month touched
fn date_labels(period: BundlePeriod, start: NaiveDate, end: NaiveDate) -> Vec<String> {
    let mut labels = Vec::new();
    if start > end {
        return labels;
    }
    match period {
        BundlePeriod::Daily => {
            let mut day = start;
            while day <= end {
                labels.push(day.format("%Y-%m-%d").to_string());
                day += Duration::days(1);
            }
        }
        BundlePeriod::Monthly => {
            let (mut y, mut m) = (start.year(), start.month());
            while (y, m) <= (end.year(), end.month()) {
                labels.push(format!("{:04}-{:02}", y, m));
                if m == 12 {
                    y += 1;
                    m = 1;
                } else {
                    m += 1;
                }
            }
        }
    }
    labels
}

/// Build the list of bundle URLs and local destinations
pub fn plan_downloads(
    base_url: &str,
    bundle_dir: &Path,
    pairs: &[String],
    timeframe: &Timeframe,
    period: BundlePeriod,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<BundleDownload> {
    let base = base_url.trim_end_matches('/');
    let local_dir = period.local_dir(bundle_dir, timeframe);
    let labels = date_labels(period, start, end);

    pairs
        .iter()
        .flat_map(|pair| {
            let local_dir = &local_dir;
            labels.iter().map(move |label| {
                let file = format!("{}-{}-{}.zip", pair, timeframe, label);
                BundleDownload {
                    url: format!(
                        "{}/{}/klines/{}/{}/{}",
                        base,
                        period.remote_segment(),
                        pair,
                        timeframe,
                        file
                    ),
                    dest: local_dir.join(file),
                }
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub planned: usize,
}

/// Sequential bundle downloader with a fixed pause between requests
#[derive(Debug, Clone)]
pub struct BundleDownloader {
    client: Client,
    pause: RateLimiter,
}

impl BundleDownloader {
    pub fn new(bundles: &BundleConfig, exchange: &ExchangeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(exchange.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            pause: RateLimiter::with_min_interval(std::time::Duration::from_millis(
                bundles.pause_ms,
            )),
        })
    }

    async fn fetch_one(&self, download: &BundleDownload) -> Result<()> {
        self.pause.acquire().await;

        let response = self
            .client
            .get(&download.url)
            .send()
            .await
            .with_context(|| format!("request failed for {}", download.url))?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP {} for {}", response.status(), download.url);
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {}", download.url))?;
        write_atomic(&download.dest, &bytes)?;
        Ok(())
    }

    /// Download every planned bundle. Existing files are skipped unless
    /// `force`; `dry_run` only logs what would happen. Failures are counted
    /// and the run continues.
    pub async fn download_all(
        &self,
        plan: &[BundleDownload],
        force: bool,
        dry_run: bool,
    ) -> DownloadSummary {
        let mut summary = DownloadSummary {
            planned: plan.len(),
            ..DownloadSummary::default()
        };

        for item in plan {
            if item.dest.exists() && !force {
                debug!("Skip existing {}", item.dest.display());
                summary.skipped += 1;
                continue;
            }
            if dry_run {
                info!("[dry-run] {} -> {}", item.url, item.dest.display());
                continue;
            }

            match self.fetch_one(item).await {
                Ok(()) => {
                    info!("Downloaded {}", item.dest.display());
                    summary.downloaded += 1;
                }
                Err(e) => {
                    warn!("Bundle download failed: {:#}", e);
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}
