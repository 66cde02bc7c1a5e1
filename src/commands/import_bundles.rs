//! Import-bundles command: load local Binance bundle archives into month partitions

use anyhow::{Context, Result};
use chrono::Utc;
use crypto_data::bundle::{discover_pairs, import_symbol, ImportOptions};
use crypto_data::storage::DataLayout;
use crypto_data::{Config, Symbol};
use std::path::PathBuf;
use tracing::{info, warn};

use super::{parse_symbols, parse_timeframe, progress_bar};

pub fn run(
    config: &Config,
    bundle_dir: Option<PathBuf>,
    timeframe: String,
    symbols: Vec<String>,
    dry_run: bool,
    force: bool,
) -> Result<()> {
    let tf = parse_timeframe(&timeframe)?;
    let bundle_dir = bundle_dir.unwrap_or_else(|| config.bundles.dir.clone());
    if !bundle_dir.is_dir() {
        anyhow::bail!("Bundle directory not found: {}", bundle_dir.display());
    }

    let symbols: Vec<Symbol> = if symbols.is_empty() {
        let pairs = discover_pairs(&bundle_dir, &tf);
        info!("Discovered {} symbols in {}", pairs.len(), bundle_dir.display());
        if pairs.is_empty() {
            warn!("No bundles for timeframe {} in {}", tf, bundle_dir.display());
            return Ok(());
        }
        parse_symbols(&pairs, &config.quote)?
    } else {
        parse_symbols(&symbols, &config.quote)?
    };

    let layout = DataLayout::new(&config.data_dir);
    let options = ImportOptions { dry_run, force };
    let pb = progress_bar(symbols.len(), "Importing...")?;

    let mut months = 0;
    let mut months_failed = 0;
    let mut failed = 0;

    for symbol in &symbols {
        pb.set_message(symbol.to_string());
        let result = import_symbol(&layout, &bundle_dir, symbol, &tf, options, Utc::now())
            .with_context(|| format!("import failed for {}", symbol));

        match result {
            Ok(summary) => {
                months += summary.months.len();
                months_failed += summary.months_failed;
                for (year, rows) in &summary.year_rows {
                    info!("{} {} {}: {} rows in roll-up", symbol, tf, year, rows);
                }
                if summary.files_skipped > 0 {
                    warn!("{}: {} bundle file(s) skipped", symbol, summary.files_skipped);
                }
            }
            Err(e) => {
                warn!("{:#}", e);
                failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    println!(
        "Imported {} month partition(s) for {} symbol(s){}; {} month(s) and {} symbol(s) failed",
        months,
        symbols.len() - failed,
        if dry_run { " [dry-run]" } else { "" },
        months_failed,
        failed
    );
    Ok(())
}
