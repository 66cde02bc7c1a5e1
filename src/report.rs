//! Markdown one-pager and CSV summaries of the stored dataset.
//!
//! For every symbol directory under `crypto/<QUOTE>/` the canonical manifest
//! is read first; anything it lacks is filled from the canonical CSV.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::manifest::read_manifest;
use crate::storage::{read_series, write_atomic, DataLayout, DATETIME_FORMAT};
use crate::{Series, Symbol, Timeframe};

const MISSING: &str = "—";

/// One row of a timeframe table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryRow {
    pub ticker: String,
    pub rows: Option<usize>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub last_close: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub mean_volume: Option<f64>,
}

impl SummaryRow {
    fn is_complete(&self) -> bool {
        self.rows.is_some()
            && self.start.is_some()
            && self.end.is_some()
            && self.last_close.is_some()
            && self.min_price.is_some()
            && self.max_price.is_some()
            && self.mean_volume.is_some()
    }

    fn has_data(&self) -> bool {
        self.rows.is_some()
    }

    fn fill_from_series(&mut self, series: &Series) {
        if series.is_empty() {
            return;
        }
        let present = |v: &f64| !v.is_nan();
        let lows: Vec<f64> = series.iter().map(|c| c.low).filter(present).collect();
        let highs: Vec<f64> = series.iter().map(|c| c.high).filter(present).collect();
        let vols: Vec<f64> = series.iter().map(|c| c.volume).filter(present).collect();

        self.rows.get_or_insert(series.len());
        if self.start.is_none() {
            self.start = series
                .first_timestamp()
                .map(|t| t.format(DATETIME_FORMAT).to_string());
        }
        if self.end.is_none() {
            self.end = series
                .last_timestamp()
                .map(|t| t.format(DATETIME_FORMAT).to_string());
        }
        if self.last_close.is_none() {
            self.last_close = series.last().map(|c| c.close).filter(present);
        }
        if self.min_price.is_none() {
            self.min_price = lows.into_iter().reduce(f64::min);
        }
        if self.max_price.is_none() {
            self.max_price = highs.into_iter().reduce(f64::max);
        }
        if self.mean_volume.is_none() && !vols.is_empty() {
            self.mean_volume = Some(vols.iter().sum::<f64>() / vols.len() as f64);
        }
    }
}

/// Symbols with a directory under `crypto/<quote>/`, sorted by base
pub fn list_symbols(layout: &DataLayout, quote: &str) -> Result<Vec<Symbol>> {
    let dir = layout.quote_dir(quote);
    if !dir.is_dir() {
        anyhow::bail!("No data directory found at {}", dir.display());
    }

    let mut symbols: Vec<Symbol> = fs::read_dir(&dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| {
            Symbol::new(format!(
                "{}/{}",
                e.file_name().to_string_lossy(),
                quote.to_uppercase()
            ))
        })
        .collect();
    symbols.sort();
    Ok(symbols)
}

/// Build the summary row for one symbol/timeframe
pub fn summarize(layout: &DataLayout, symbol: &Symbol, timeframe: &Timeframe) -> Result<SummaryRow> {
    let mut row = SummaryRow {
        ticker: symbol.to_string(),
        ..SummaryRow::default()
    };

    if let Some(m) = read_manifest(layout.manifest_path(symbol, timeframe)) {
        row.rows = Some(m.rows).filter(|&r| r > 0);
        row.start = m.start_date;
        row.end = m.end_date;
        row.last_close = m.last_close;
        row.min_price = m.fields.low.min;
        row.max_price = m.fields.high.max;
        row.mean_volume = m.insights.avg_volume;
    }

    if !row.is_complete() {
        let path = layout.series_path(symbol, timeframe);
        debug!("Filling {} {} from {}", symbol, timeframe, path.display());
        if let Some(series) = read_series(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?
        {
            row.fill_from_series(&series);
        }
    }

    Ok(row)
}

/// Number with thousands separators; values of 1000 and above keep up to
/// four decimals, trailing zeros stripped
pub fn format_number(x: f64) -> String {
    if !x.is_finite() {
        return MISSING.to_string();
    }
    let fixed = format!("{:.4}", x);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if x.abs() < 1000.0 {
        return trimmed.to_string();
    }

    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", trimmed),
    };
    let (int_part, frac) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    let grouped = group_thousands(int_part);
    match frac {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Volume with a K/M/B suffix
pub fn format_volume(v: f64) -> String {
    if !v.is_finite() {
        return MISSING.to_string();
    }
    let a = v.abs();
    if a >= 1e9 {
        format!("{:.2}B", v / 1e9)
    } else if a >= 1e6 {
        format!("{:.2}M", v / 1e6)
    } else if a >= 1e3 {
        format!("{:.2}K", v / 1e3)
    } else {
        format!("{:.2}", v)
    }
}

fn opt<T>(v: Option<T>, f: impl Fn(T) -> String) -> String {
    v.map(f).unwrap_or_else(|| MISSING.to_string())
}

/// Markdown table for one timeframe
pub fn render_table(timeframe: &Timeframe, rows: &[SummaryRow]) -> String {
    let mut lines = vec![
        format!("## {} summary", timeframe),
        "| ticker | rows | start | end | last | min | max | mean_vol |".to_string(),
        "|:---|---:|:---|:---|---:|---:|---:|---:|".to_string(),
    ];

    for row in rows {
        if !row.has_data() {
            lines.push(format!(
                "| {} | {m} | {m} | {m} | {m} | {m} | {m} | {m} |",
                row.ticker,
                m = MISSING
            ));
            continue;
        }
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            row.ticker,
            opt(row.rows, |r| group_thousands(&r.to_string())),
            row.start.as_deref().unwrap_or(MISSING),
            row.end.as_deref().unwrap_or(MISSING),
            opt(row.last_close, format_number),
            opt(row.min_price, format_number),
            opt(row.max_price, format_number),
            opt(row.mean_volume, format_volume),
        ));
    }

    lines.join("\n")
}

/// Full one-pager document
pub fn render_onepager(
    data_root: &Path,
    symbols_scanned: usize,
    sections: &[(Timeframe, Vec<SummaryRow>)],
    generated: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    out.push_str("# Data one-pager: crypto dataset\n\n");
    out.push_str(&format!("Generated: {}\n\n", generated.format("%Y-%m-%d %H:%M UTC")));
    out.push_str(&format!("- Symbols scanned: {}\n", symbols_scanned));
    out.push_str(&format!("- Data root: `{}`\n\n", data_root.display()));

    for (tf, rows) in sections {
        out.push_str(&render_table(tf, rows));
        out.push_str("\n\n");
    }

    out.push_str("---\n");
    out.push_str("Values come from `manifest_<timeframe>.yaml` when present, ");
    out.push_str("otherwise from the canonical CSV.\n");
    out
}

/// CSV summary for one timeframe
pub fn render_csv(rows: &[SummaryRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "ticker",
        "rows",
        "start",
        "end",
        "last_close",
        "min_price",
        "max_price",
        "mean_volume",
    ])?;

    let num = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
    for row in rows {
        writer.write_record([
            row.ticker.clone(),
            row.rows.map(|r| r.to_string()).unwrap_or_default(),
            row.start.clone().unwrap_or_default(),
            row.end.clone().unwrap_or_default(),
            num(row.last_close),
            num(row.min_price),
            num(row.max_price),
            num(row.mean_volume),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV summary: {}", e))
}

/// Paths written by [`generate_report`]
#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub markdown: PathBuf,
    pub csv: Vec<PathBuf>,
    pub symbols: usize,
}

/// Scan the dataset and write the one-pager plus one CSV per timeframe
/// (`data_summary_<tf>.csv` next to the markdown file)
pub fn generate_report(
    layout: &DataLayout,
    quote: &str,
    timeframes: &[Timeframe],
    output: &Path,
    now: DateTime<Utc>,
) -> Result<ReportOutput> {
    let symbols = list_symbols(layout, quote)?;
    info!("Summarizing {} symbols", symbols.len());

    let mut sections = Vec::with_capacity(timeframes.len());
    for tf in timeframes {
        let rows = symbols
            .iter()
            .map(|s| summarize(layout, s, tf))
            .collect::<Result<Vec<_>>>()?;
        sections.push((*tf, rows));
    }

    let markdown = render_onepager(&layout.quote_dir(quote), symbols.len(), &sections, now);
    write_atomic(output, markdown.as_bytes())
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let out_dir = output.parent().unwrap_or_else(|| Path::new("."));
    let mut csv_paths = Vec::new();
    for (tf, rows) in &sections {
        let path = out_dir.join(format!("data_summary_{}.csv", tf));
        write_atomic(&path, &render_csv(rows)?)?;
        csv_paths.push(path);
    }

    info!("Wrote one-pager to {}", output.display());
    Ok(ReportOutput {
        markdown: output.to_path_buf(),
        csv: csv_paths,
        symbols: symbols.len(),
    })
}
