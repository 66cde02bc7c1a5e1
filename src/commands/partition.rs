//! Partition command: split canonical series into month partitions

use anyhow::{Context, Result};
use chrono::Utc;
use crypto_data::partition::{partition_symbol, ImportOptions};
use crypto_data::report::list_symbols;
use crypto_data::storage::DataLayout;
use crypto_data::{Config, Symbol};
use tracing::{info, warn};

use super::{parse_symbols, parse_timeframe, progress_bar};

pub fn run(
    config: &Config,
    symbols: Vec<String>,
    timeframe: String,
    dry_run: bool,
    force: bool,
) -> Result<()> {
    let tf = parse_timeframe(&timeframe)?;
    let layout = DataLayout::new(&config.data_dir);

    let symbols: Vec<Symbol> = if symbols.is_empty() {
        list_symbols(&layout, &config.quote)?
    } else {
        parse_symbols(&symbols, &config.quote)?
    };

    let options = ImportOptions { dry_run, force };
    let pb = progress_bar(symbols.len(), "Partitioning...")?;

    let mut months = 0;
    let mut months_failed = 0;
    let mut failed = 0;

    for symbol in &symbols {
        pb.set_message(symbol.to_string());
        let result = partition_symbol(&layout, symbol, &tf, options, Utc::now())
            .with_context(|| format!("partition failed for {}", symbol));

        match result {
            Ok(summary) => {
                months += summary.months.len();
                months_failed += summary.months_failed;
                for (year, rows) in &summary.year_rows {
                    info!("{} {} {}: {} rows in roll-up", symbol, tf, year, rows);
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
        "Wrote {} month partition(s) for {} symbol(s){}; {} month(s) and {} symbol(s) failed",
        months,
        symbols.len() - failed,
        if dry_run { " [dry-run]" } else { "" },
        months_failed,
        failed
    );
    Ok(())
}
