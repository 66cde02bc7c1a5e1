//! CLI subcommand implementations

pub mod download_bundles;
pub mod fetch;
pub mod import_bundles;
pub mod partition;
pub mod report;
pub mod update;
pub mod validate;

use anyhow::{Context, Result};
use crypto_data::binance::is_valid_interval;
use crypto_data::{Symbol, Timeframe};
use indicatif::{ProgressBar, ProgressStyle};

/// Symbols used when none are given on the command line
pub const DEFAULT_SYMBOLS: &[&str] = &["BTC", "ETH", "BNB", "XRP", "ADA"];

/// Normalize CLI symbols (comma-separated or repeated) into `BASE/QUOTE`
pub fn parse_symbols(inputs: &[String], quote: &str) -> Result<Vec<Symbol>> {
    let raw: Vec<String> = if inputs.is_empty() {
        DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
    } else {
        inputs
            .iter()
            .flat_map(|s| s.split(','))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };

    raw.iter()
        .map(|s| Symbol::parse(s, quote).with_context(|| format!("Bad symbol {:?}", s)))
        .collect()
}

/// Parse a timeframe and check Binance serves it
pub fn parse_timeframe(s: &str) -> Result<Timeframe> {
    let tf: Timeframe = s.parse()?;
    if !is_valid_interval(&tf.to_string()) {
        anyhow::bail!("Timeframe {} is not a Binance interval", tf);
    }
    Ok(tf)
}

pub fn progress_bar(len: usize, message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    Ok(pb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbols_defaults_and_lists() {
        let defaults = parse_symbols(&[], "USDT").unwrap();
        assert_eq!(defaults.len(), 5);
        assert_eq!(defaults[0].as_str(), "BTC/USDT");

        let given = parse_symbols(&["eth,SOLUSDT".to_string(), "ada/btc".to_string()], "USDT").unwrap();
        let names: Vec<&str> = given.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["ETH/USDT", "SOL/USDT", "ADA/BTC"]);
    }

    #[test]
    fn test_parse_timeframe() {
        assert!(parse_timeframe("1m").is_ok());
        assert!(parse_timeframe("1M").is_ok());
        assert!(parse_timeframe("2d").is_err());
        assert!(parse_timeframe("abc").is_err());
    }
}
