//! Validate command: check stored series and save the validation report and
//! summary statistics

use anyhow::Result;
use chrono::Utc;
use crypto_data::report::list_symbols;
use crypto_data::storage::{read_series, DataLayout};
use crypto_data::validate::ValidationRun;
use crypto_data::{Config, Symbol};
use std::path::PathBuf;
use tracing::{info, warn};

use super::{parse_symbols, parse_timeframe};

pub fn run(
    config: &Config,
    symbols: Vec<String>,
    timeframe: String,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let tf = parse_timeframe(&timeframe)?;
    let layout = DataLayout::new(&config.data_dir);

    let symbols: Vec<Symbol> = if symbols.is_empty() {
        list_symbols(&layout, &config.quote)?
    } else {
        parse_symbols(&symbols, &config.quote)?
    };

    let mut run = ValidationRun::new(tf, Utc::now());

    for symbol in &symbols {
        let path = layout.series_path(symbol, &tf);
        let series = match read_series(&path) {
            Ok(Some(series)) => series,
            Ok(None) => {
                warn!("{} {}: no data file at {}", symbol, tf, path.display());
                continue;
            }
            Err(e) => {
                warn!("{} {}: {}", symbol, tf, e);
                continue;
            }
        };

        let result = run.add(symbol.as_str(), &series);
        for e in &result.report.errors {
            warn!("{}: {}", symbol, e);
        }
        for w in &result.report.warnings {
            info!("{}: {}", symbol, w);
        }
        println!(
            "{} {}: {} rows, {} error(s), {} warning(s), {} gap(s)",
            symbol,
            tf,
            result.rows,
            result.report.errors.len(),
            result.report.warnings.len(),
            result.report.gaps.len()
        );
    }

    if run.total_symbols == 0 {
        warn!("No {} series to validate", tf);
        return Ok(());
    }

    let dir = output_dir.unwrap_or_else(|| config.data_dir.clone());
    let (json_path, csv_path) = run.save(&dir)?;
    println!("Validation report: {}", json_path.display());
    println!("Summary statistics: {}", csv_path.display());

    if !run.is_valid() {
        let failed = run
            .symbols
            .iter()
            .filter(|(_, s)| !s.report.is_valid())
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        anyhow::bail!("{} failed validation: {}", tf, failed);
    }
    Ok(())
}
