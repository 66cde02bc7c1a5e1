//! Series validation and summary statistics. Problems are reported, never
//! corrected.
//!
//! A validation run over several symbols is saved as
//! `validation_report_<tf>_<ts>.json` plus `summary_stats_<tf>_<ts>.csv`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::storage::{write_atomic, DATETIME_FORMAT};
use crate::{Candle, Series, Timeframe};

/// Annual risk-free rate used for the Sharpe ratio
pub const RISK_FREE_RATE: f64 = 0.02;

/// Run of missing bars between two consecutive candles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub after: DateTime<Utc>,
    pub before: DateTime<Utc>,
    pub missing_bars: i64,
}

/// Result of data validation
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub gaps: Vec<Gap>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate candle data for consistency.
///
/// Errors: candle invariant violations and duplicate timestamps.
/// Warnings: out-of-order rows and gaps wider than one `timeframe` bar.
pub fn validate_candles(candles: &[Candle], timeframe: Option<&Timeframe>) -> ValidationReport {
    let mut report = ValidationReport::default();

    if candles.is_empty() {
        report.warnings.push("No candles provided".to_string());
        return report;
    }

    let mut seen = HashSet::with_capacity(candles.len());

    for (i, candle) in candles.iter().enumerate() {
        if let Err(e) = candle.validate() {
            report
                .errors
                .push(format!("Candle {} ({}): {}", i, candle.datetime, e));
        }

        if !seen.insert(candle.datetime) {
            report
                .errors
                .push(format!("Candle {}: duplicate timestamp {}", i, candle.datetime));
        }

        if i == 0 {
            continue;
        }
        let prev = &candles[i - 1];
        if candle.datetime < prev.datetime {
            report
                .warnings
                .push(format!("Candle {}: not chronological", i));
        }

        if let Some(tf) = timeframe {
            let step = tf.duration();
            let delta = candle.datetime - prev.datetime;
            if delta > step {
                let missing = delta.num_milliseconds() / step.num_milliseconds().max(1) - 1;
                report.gaps.push(Gap {
                    after: prev.datetime,
                    before: candle.datetime,
                    missing_bars: missing,
                });
            }
        }
    }

    if !report.gaps.is_empty() {
        let missing: i64 = report.gaps.iter().map(|g| g.missing_bars).sum();
        report.warnings.push(format!(
            "{} gap(s), {} missing bar(s) in total",
            report.gaps.len(),
            missing
        ));
    }

    report
}

// =============================================================================
// Summary statistics
// =============================================================================

/// Per-symbol statistics saved alongside a validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub symbol: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub observations: usize,
    pub avg_price: Option<f64>,
    pub price_std: Option<f64>,
    pub avg_volume: Option<f64>,
    /// Percent
    pub total_return: Option<f64>,
    /// Percent
    pub volatility_annualized: Option<f64>,
    /// Percent, zero or negative
    pub max_drawdown: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub null_values: usize,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Bars per 365-day year
pub fn periods_per_year(timeframe: &Timeframe) -> f64 {
    let bar = timeframe.duration().num_seconds().max(1) as f64;
    (365 * 24 * 3600) as f64 / bar
}

/// Simple returns between consecutive closes; pairs with a missing or zero
/// previous close are skipped
pub fn simple_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0].is_finite() && w[1].is_finite() && w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

/// Largest peak-to-trough fall of `closes`, in percent (`-25.0` for a 25% fall)
pub fn max_drawdown_pct(closes: &[f64]) -> Option<f64> {
    let mut prices = closes.iter().copied().filter(|p| p.is_finite() && *p > 0.0);
    let mut peak = prices.next()?;
    let mut max_dd: f64 = 0.0;

    for price in prices {
        if price > peak {
            peak = price;
        }
        let dd = (price - peak) / peak;
        if dd < max_dd {
            max_dd = dd;
        }
    }
    Some(max_dd * 100.0)
}

/// Annualized Sharpe ratio of per-bar returns.
///
/// `None` with fewer than two returns; `0.0` when the returns never vary.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let std = Statistics::std_dev(returns.iter());
    if std < 1e-12 {
        return Some(0.0);
    }
    let excess = Statistics::mean(returns.iter()) - RISK_FREE_RATE / periods_per_year;
    finite(excess / std * periods_per_year.sqrt())
}

/// Statistics for one stored series
pub fn summary_stats(symbol: &str, series: &Series, timeframe: &Timeframe) -> SummaryStats {
    let closes: Vec<f64> = series.closes().collect();
    let present: Vec<f64> = closes.iter().copied().filter(|c| !c.is_nan()).collect();
    let volumes: Vec<f64> = series.iter().map(|c| c.volume).filter(|v| !v.is_nan()).collect();
    let returns = simple_returns(&closes);
    let ppy = periods_per_year(timeframe);

    let null_values = series
        .iter()
        .map(|c| {
            [c.open, c.high, c.low, c.close, c.volume]
                .iter()
                .filter(|v| v.is_nan())
                .count()
        })
        .sum();

    let total_return = match (present.first(), present.last()) {
        (Some(&first), Some(&last)) if present.len() >= 2 && first != 0.0 => {
            finite((last / first - 1.0) * 100.0)
        }
        _ => None,
    };

    let mean_of = |v: &[f64]| (!v.is_empty()).then(|| Statistics::mean(v.iter())).and_then(finite);
    let std_of = |v: &[f64]| (v.len() >= 2).then(|| Statistics::std_dev(v.iter())).and_then(finite);

    SummaryStats {
        symbol: symbol.to_string(),
        start_date: series
            .first_timestamp()
            .map(|t| t.format(DATETIME_FORMAT).to_string()),
        end_date: series
            .last_timestamp()
            .map(|t| t.format(DATETIME_FORMAT).to_string()),
        observations: series.len(),
        avg_price: mean_of(&present),
        price_std: std_of(&present),
        avg_volume: mean_of(&volumes),
        total_return,
        volatility_annualized: std_of(&returns).map(|s| s * ppy.sqrt() * 100.0),
        max_drawdown: max_drawdown_pct(&closes),
        sharpe_ratio: sharpe_ratio(&returns, ppy),
        null_values,
    }
}

// =============================================================================
// Multi-symbol runs
// =============================================================================

/// Validation result for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolValidation {
    pub rows: usize,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub null_count: usize,
    #[serde(flatten)]
    pub report: ValidationReport,
}

/// Validation of every symbol at one timeframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRun {
    pub timeframe: Timeframe,
    pub generated: DateTime<Utc>,
    pub total_symbols: usize,
    pub symbols: BTreeMap<String, SymbolValidation>,
    #[serde(skip)]
    pub stats: Vec<SummaryStats>,
}

impl ValidationRun {
    pub fn new(timeframe: Timeframe, generated: DateTime<Utc>) -> Self {
        Self {
            timeframe,
            generated,
            total_symbols: 0,
            symbols: BTreeMap::new(),
            stats: Vec::new(),
        }
    }

    /// Validate one series and record its statistics
    pub fn add(&mut self, symbol: &str, series: &Series) -> &SymbolValidation {
        let stats = summary_stats(symbol, series, &self.timeframe);
        let entry = SymbolValidation {
            rows: series.len(),
            start_date: stats.start_date.clone(),
            end_date: stats.end_date.clone(),
            null_count: stats.null_values,
            report: validate_candles(series.candles(), Some(&self.timeframe)),
        };
        self.stats.push(stats);
        self.total_symbols += 1;
        self.symbols.insert(symbol.to_string(), entry);
        &self.symbols[symbol]
    }

    pub fn is_valid(&self) -> bool {
        self.symbols.values().all(|s| s.report.is_valid())
    }

    /// Write the JSON report and the CSV statistics into `dir`
    pub fn save(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        let stamp = self.generated.format("%Y%m%d_%H%M%S");
        let json_path = dir.join(format!("validation_report_{}_{}.json", self.timeframe, stamp));
        let csv_path = dir.join(format!("summary_stats_{}_{}.csv", self.timeframe, stamp));

        let json = serde_json::to_vec_pretty(self).context("Failed to serialize validation report")?;
        write_atomic(&json_path, &json)?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        for stats in &self.stats {
            writer.serialize(stats)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush summary CSV: {}", e))?;
        write_atomic(&csv_path, &bytes)?;

        Ok((json_path, csv_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn candle(hour: i64) -> Candle {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour);
        Candle::new_unchecked(t, 100.0, 105.0, 95.0, 102.0, 1000.0)
    }

    #[test]
    fn test_validate_clean_series() {
        let candles: Vec<Candle> = (0..5).map(candle).collect();
        let tf: Timeframe = "1h".parse().unwrap();
        let report = validate_candles(&candles, Some(&tf));
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
        assert!(report.gaps.is_empty());
    }

    #[test]
    fn test_reports_invariant_violations() {
        let mut bad = candle(1);
        bad.high = 90.0;
        let candles = vec![candle(0), bad];
        let report = validate_candles(&candles, None);
        assert!(!report.is_valid());
        assert!(report.errors[0].contains("high"));
    }

    #[test]
    fn test_reports_duplicates_and_order() {
        let candles = vec![candle(0), candle(2), candle(1), candle(1)];
        let report = validate_candles(&candles, None);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("duplicate"));
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_reports_gaps() {
        let candles = vec![candle(0), candle(1), candle(5)];
        let tf: Timeframe = "1h".parse().unwrap();
        let report = validate_candles(&candles, Some(&tf));
        assert!(report.is_valid());
        assert_eq!(
            report.gaps,
            vec![Gap {
                after: candle(1).datetime,
                before: candle(5).datetime,
                missing_bars: 3
            }]
        );
    }

    fn daily(closes: &[f64]) -> Series {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new_unchecked(t0 + Duration::days(i as i64), c, c, c, c, 10.0))
            .collect()
    }

    #[test]
    fn test_max_drawdown() {
        assert_relative_eq!(
            max_drawdown_pct(&[100.0, 120.0, 90.0, 110.0, 60.0, 130.0]).unwrap(),
            -50.0,
            epsilon = 1e-9
        );
        assert_eq!(max_drawdown_pct(&[1.0, 2.0, 3.0]), Some(0.0));
        assert_eq!(max_drawdown_pct(&[]), None);
        assert_relative_eq!(max_drawdown_pct(&[100.0, f64::NAN, 75.0]).unwrap(), -25.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sharpe_ratio() {
        let returns = [0.01, 0.03, -0.01, 0.01];
        // mean 0.01, sample std sqrt(0.0008 / 3)
        let std = (0.0008_f64 / 3.0).sqrt();
        let expected = (0.01 - RISK_FREE_RATE / 365.0) / std * 365.0_f64.sqrt();
        assert_relative_eq!(sharpe_ratio(&returns, 365.0).unwrap(), expected, epsilon = 1e-9);

        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01], 365.0), Some(0.0));
        assert_eq!(sharpe_ratio(&[0.01], 365.0), None);
    }

    #[test]
    fn test_periods_per_year() {
        assert_relative_eq!(periods_per_year(&"1d".parse().unwrap()), 365.0);
        assert_relative_eq!(periods_per_year(&"1h".parse().unwrap()), 8760.0);
        assert_relative_eq!(periods_per_year(&"15m".parse().unwrap()), 35040.0);
    }

    #[test]
    fn test_summary_stats() {
        let tf: Timeframe = "1d".parse().unwrap();
        let stats = summary_stats("BTC/USDT", &daily(&[100.0, 110.0, 99.0, 150.0]), &tf);

        assert_eq!(stats.observations, 4);
        assert_eq!(stats.start_date.as_deref(), Some("2024-01-01 00:00:00"));
        assert_eq!(stats.end_date.as_deref(), Some("2024-01-04 00:00:00"));
        assert_relative_eq!(stats.total_return.unwrap(), 50.0, epsilon = 1e-9);
        assert_relative_eq!(stats.max_drawdown.unwrap(), -10.0, epsilon = 1e-9);
        assert_relative_eq!(stats.avg_price.unwrap(), 114.75, epsilon = 1e-9);
        assert_relative_eq!(stats.avg_volume.unwrap(), 10.0);
        assert_eq!(stats.null_values, 0);

        let returns = simple_returns(&[100.0, 110.0, 99.0, 150.0]);
        let vol = Statistics::std_dev(returns.iter()) * 365.0_f64.sqrt() * 100.0;
        assert_relative_eq!(stats.volatility_annualized.unwrap(), vol, epsilon = 1e-9);
        assert!(stats.sharpe_ratio.unwrap() > 0.0);
    }

    #[test]
    fn test_summary_stats_single_row() {
        let tf: Timeframe = "1d".parse().unwrap();
        let stats = summary_stats("BTC/USDT", &daily(&[100.0]), &tf);
        assert_eq!(stats.total_return, None);
        assert_eq!(stats.volatility_annualized, None);
        assert_eq!(stats.sharpe_ratio, None);
        assert_eq!(stats.max_drawdown, Some(0.0));
    }

    #[test]
    fn test_validation_run_saves_json_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let tf: Timeframe = "1d".parse().unwrap();
        let generated = Utc.with_ymd_and_hms(2024, 6, 5, 9, 30, 0).unwrap();

        let mut run = ValidationRun::new(tf, generated);
        run.add("BTC/USDT", &daily(&[100.0, 110.0, 99.0, 150.0]));
        let mut bad = daily(&[10.0, 11.0]).into_candles();
        bad[1].low = 20.0;
        run.add("ETH/USDT", &Series::from_unsorted(bad));
        assert!(!run.is_valid());

        let (json_path, csv_path) = run.save(dir.path()).unwrap();
        assert!(json_path.ends_with("validation_report_1d_20240605_093000.json"));
        assert!(csv_path.ends_with("summary_stats_1d_20240605_093000.csv"));

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&json_path).unwrap()).unwrap();
        assert_eq!(json["timeframe"], "1d");
        assert_eq!(json["total_symbols"], 2);
        assert_eq!(json["symbols"]["BTC/USDT"]["rows"], 4);
        assert_eq!(json["symbols"]["ETH/USDT"]["errors"].as_array().unwrap().len(), 1);

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("symbol,start_date,end_date,observations"));
        assert!(lines.next().unwrap().starts_with("BTC/USDT,2024-01-01 00:00:00,"));
        assert!(lines.next().unwrap().starts_with("ETH/USDT,"));
    }
}
