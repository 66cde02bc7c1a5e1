//! Update command: incrementally bring stored series up to date

use anyhow::Result;
use chrono::{Duration, Utc};
use crypto_data::binance::BinanceClient;
use crypto_data::pipeline::{update_symbol, UpdateOptions};
use crypto_data::storage::DataLayout;
use crypto_data::Config;
use tracing::{info, warn};

use super::{parse_symbols, parse_timeframe, progress_bar};

pub fn run(
    config: &Config,
    symbols: Vec<String>,
    timeframe: String,
    overlap: Option<u32>,
    lookback_days: Option<u32>,
    include_today: bool,
) -> Result<()> {
    let tf = parse_timeframe(&timeframe)?;
    let symbols = parse_symbols(&symbols, &config.quote)?;
    let layout = DataLayout::new(&config.data_dir);

    let options = UpdateOptions {
        overlap: overlap.unwrap_or(config.update.overlap),
        lookback: Duration::days(lookback_days.unwrap_or(config.update.lookback_days) as i64),
        include_now: include_today || config.update.include_now,
        page_size: config.exchange.page_size,
        max_pages: config.exchange.max_pages,
    };

    let rt = tokio::runtime::Runtime::new()?;
    let client = BinanceClient::new(&config.exchange)?;

    info!(
        "Updating {} symbols at {} (overlap {}, include today: {})",
        symbols.len(),
        tf,
        options.overlap,
        options.include_now
    );

    let pb = progress_bar(symbols.len(), "Updating...")?;
    let mut failed = Vec::new();

    for symbol in &symbols {
        pb.set_message(symbol.to_string());
        let result = rt.block_on(update_symbol(
            &client,
            &layout,
            symbol,
            &tf,
            &options,
            Utc::now(),
        ));

        match result {
            Ok(summary) => {
                info!(
                    "{} {}: {} fetched, {} new, {} replaced, {} rows total",
                    symbol,
                    tf,
                    summary.fetched,
                    summary.store.merge.added,
                    summary.store.merge.replaced,
                    summary.store.merge.rows
                );
                if summary.hit_page_limit {
                    warn!("{} {}: page limit reached, run again to continue", symbol, tf);
                }
            }
            Err(e) => {
                warn!("{} {}: update failed: {:#}", symbol, tf, e);
                failed.push(symbol.clone());
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    if !failed.is_empty() {
        warn!("{} symbol(s) failed: {:?}", failed.len(), failed);
    }
    Ok(())
}
