//! Fetch command: pull history from Binance and merge it into the canonical CSVs

use anyhow::Result;
use chrono::{Duration, Utc};
use crypto_data::binance::BinanceClient;
use crypto_data::fetch::{fetch_latest, fetch_range, FetchRange};
use crypto_data::pipeline::store_series;
use crypto_data::storage::DataLayout;
use crypto_data::Config;
use tracing::{info, warn};

use super::{parse_symbols, parse_timeframe};

pub fn run(
    config: &Config,
    symbols: Vec<String>,
    timeframe: String,
    days_back: u32,
    limit: Option<u32>,
) -> Result<()> {
    let tf = parse_timeframe(&timeframe)?;
    let symbols = parse_symbols(&symbols, &config.quote)?;
    let layout = DataLayout::new(&config.data_dir);

    let rt = tokio::runtime::Runtime::new()?;
    let client = BinanceClient::new(&config.exchange)?;

    info!(
        "Fetching {} symbols at {} into {}",
        symbols.len(),
        tf,
        config.data_dir.display()
    );

    let mut ok = 0;
    let mut total = 0;

    for symbol in &symbols {
        let now = Utc::now();
        let series = match limit {
            Some(n) => rt.block_on(fetch_latest(&client, symbol, &tf, n)),
            None => {
                let range = FetchRange {
                    start: now - Duration::days(days_back as i64),
                    end: now,
                    page_size: config.exchange.page_size,
                    max_pages: config.exchange.max_pages,
                };
                let outcome = rt.block_on(fetch_range(&client, symbol, &tf, &range));
                if outcome.hit_page_limit {
                    warn!("{} {}: page limit reached, history is partial", symbol, tf);
                }
                outcome.series
            }
        };

        if series.is_empty() {
            warn!("{} {}: nothing fetched", symbol, tf);
            continue;
        }

        match store_series(&layout, symbol, &tf, &series, now) {
            Ok(outcome) => {
                ok += 1;
                total += series.len();
                info!("✓ {} {} -> {}", symbol, tf, outcome.path.display());
            }
            Err(e) => warn!("✗ {} {}: {:#}", symbol, tf, e),
        }
    }

    println!(
        "Fetched {} candles; {}/{} symbols stored",
        total,
        ok,
        symbols.len()
    );
    Ok(())
}
