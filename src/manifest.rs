//! YAML manifests describing a stored series.
//!
//! A manifest is a derived cache: it is rebuilt from the series after every
//! write and never edited by hand. Every writer path goes through
//! [`synthesize`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use statrs::statistics::{Data, Median, Statistics};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::error::DataResult;
use crate::storage::{write_atomic, MonthKey, DATETIME_FORMAT};
use crate::{Series, Symbol, Timeframe};

/// Summary statistics for one OHLCV column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub name: String,
    pub description: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std: Option<f64>,
    pub nulls: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fields {
    pub open: FieldStats,
    pub high: FieldStats,
    pub low: FieldStats,
    pub close: FieldStats,
    pub volume: FieldStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min_close: Option<f64>,
    pub max_close: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    pub price_range: PriceRange,
    pub avg_volume: Option<f64>,
}

/// Manifest sidecar for a series file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub symbol: String,
    pub timeframe: String,
    pub rows: usize,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub total_return_pct: Option<f64>,
    pub fields: Fields,
    pub insights: Insights,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

/// Optional extras stamped onto a manifest
#[derive(Debug, Clone, Default)]
pub struct ManifestOptions {
    /// CSV bytes of the written series; their SHA-256 goes into `sha256`
    pub checksum_of: Option<Vec<u8>>,
    /// Value for the `updated` key
    pub updated: Option<DateTime<Utc>>,
    /// Record the final close as `last_close`
    pub last_close: bool,
}

impl ManifestOptions {
    /// Options used for month partitions written by the bundle importer
    pub fn partition(csv_bytes: Vec<u8>, now: DateTime<Utc>) -> Self {
        Self {
            checksum_of: Some(csv_bytes),
            updated: Some(now),
            last_close: true,
        }
    }
}

/// Hex SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Timestamp string used for `updated` keys
pub fn format_updated(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn column_stats(name: &str, description: &str, values: impl Iterator<Item = f64>) -> FieldStats {
    let (present, nulls): (Vec<f64>, Vec<f64>) = values.partition(|v| !v.is_nan());

    let (min, max, mean, median, std) = if present.is_empty() {
        (None, None, None, None, None)
    } else {
        let std = if present.len() < 2 {
            None
        } else {
            finite(Statistics::std_dev(present.iter()))
        };
        (
            finite(Statistics::min(present.iter())),
            finite(Statistics::max(present.iter())),
            finite(Statistics::mean(present.iter())),
            finite(Data::new(present.clone()).median()),
            std,
        )
    };

    FieldStats {
        name: name.to_string(),
        description: description.to_string(),
        min,
        max,
        mean,
        median,
        std,
        nulls: nulls.len(),
    }
}

/// `(last_close / first_close - 1) * 100`, or `None` when undefined
pub fn total_return_pct(series: &Series) -> Option<f64> {
    if series.len() < 2 {
        return None;
    }
    let first = series.first()?.close;
    let last = series.last()?.close;
    if first == 0.0 {
        return None;
    }
    finite((last / first - 1.0) * 100.0)
}

/// Build the manifest for a series
pub fn synthesize(
    series: &Series,
    symbol: &Symbol,
    timeframe: &Timeframe,
    options: &ManifestOptions,
) -> Manifest {
    let col = |f: fn(&crate::Candle) -> f64| series.iter().map(f);

    let fields = Fields {
        open: column_stats("open", "Open price for the interval", col(|c| c.open)),
        high: column_stats("high", "Highest trade price during the interval", col(|c| c.high)),
        low: column_stats("low", "Lowest trade price during the interval", col(|c| c.low)),
        close: column_stats("close", "Close price for the interval", col(|c| c.close)),
        volume: column_stats("volume", "Traded volume during the interval", col(|c| c.volume)),
    };

    let insights = Insights {
        price_range: PriceRange {
            min_close: fields.close.min,
            max_close: fields.close.max,
        },
        avg_volume: fields.volume.mean,
    };

    Manifest {
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        rows: series.len(),
        start_date: series
            .first_timestamp()
            .map(|t| t.format(DATETIME_FORMAT).to_string()),
        end_date: series
            .last_timestamp()
            .map(|t| t.format(DATETIME_FORMAT).to_string()),
        total_return_pct: total_return_pct(series),
        fields,
        insights,
        last_close: if options.last_close {
            series.last().and_then(|c| finite(c.close))
        } else {
            None
        },
        sha256: options.checksum_of.as_deref().map(sha256_hex),
        updated: options.updated.map(format_updated),
    }
}

pub fn write_manifest(path: impl AsRef<Path>, manifest: &Manifest) -> DataResult<()> {
    let yaml = serde_yaml::to_string(manifest)?;
    write_atomic(path, yaml.as_bytes())
}

/// Read a manifest. Missing or unparseable files are treated as absent.
pub fn read_manifest(path: impl AsRef<Path>) -> Option<Manifest> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).ok()?;
    match serde_yaml::from_str(&raw) {
        Ok(m) => Some(m),
        Err(e) => {
            warn!("Ignoring unreadable manifest {}: {}", path.display(), e);
            None
        }
    }
}

// =============================================================================
// Yearly roll-up
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthEntry {
    pub rows: usize,
    pub start: Option<String>,
    pub end: Option<String>,
    pub sha256: Option<String>,
}

impl MonthEntry {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        Self {
            rows: manifest.rows,
            start: manifest.start_date.clone(),
            end: manifest.end_date.clone(),
            sha256: manifest.sha256.clone(),
        }
    }
}

/// Per-year index of month partitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearManifest {
    pub year: i32,
    pub months: BTreeMap<String, MonthEntry>,
    pub rows: usize,
    pub updated: String,
}

impl YearManifest {
    pub fn new(year: i32, now: DateTime<Utc>) -> Self {
        Self {
            year,
            months: BTreeMap::new(),
            rows: 0,
            updated: format_updated(now),
        }
    }

    /// Insert or replace the entry for `month` and refresh the totals
    pub fn upsert(&mut self, month: MonthKey, entry: MonthEntry, now: DateTime<Utc>) {
        self.months.insert(month.to_string(), entry);
        self.rows = self.months.values().map(|m| m.rows).sum();
        self.updated = format_updated(now);
    }
}

/// Merge freshly written months into the roll-up at `path` and rewrite it.
/// Months recorded by earlier runs are kept.
pub fn update_year_manifest(
    path: impl AsRef<Path>,
    year: i32,
    months: &[(MonthKey, MonthEntry)],
    now: DateTime<Utc>,
) -> DataResult<YearManifest> {
    let path = path.as_ref();
    let mut rollup = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_yaml::from_str::<YearManifest>(&raw).ok())
        .filter(|m| m.year == year)
        .unwrap_or_else(|| YearManifest::new(year, now));

    for (month, entry) in months {
        rollup.upsert(*month, entry.clone(), now);
    }

    let yaml = serde_yaml::to_string(&rollup)?;
    write_atomic(path, yaml.as_bytes())?;
    Ok(rollup)
}
