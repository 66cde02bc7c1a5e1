//! Configuration management
//!
//! Optional JSON configuration file with serde defaults for every field.
//! `.env` and the process environment can override the data and bundle
//! directories.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `data_dir`
pub const ENV_DATA_DIR: &str = "CRYPTO_DATA_DIR";
/// Environment variable overriding `bundles.dir`
pub const ENV_BUNDLE_DIR: &str = "CRYPTO_BUNDLE_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Quote currency appended to bare symbols
    pub quote: String,
    pub exchange: ExchangeConfig,
    pub update: UpdateConfig,
    pub bundles: BundleConfig,
    pub report: ReportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("data"),
            quote: crate::types::DEFAULT_QUOTE.to_string(),
            exchange: ExchangeConfig::default(),
            update: UpdateConfig::default(),
            bundles: BundleConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise defaults, then apply `.env` and
    /// environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(dir) = std::env::var(ENV_BUNDLE_DIR) {
            if !dir.trim().is_empty() {
                self.bundles.dir = PathBuf::from(dir);
            }
        }
    }
}

/// Exchange client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub min_request_interval_ms: u64,
    pub page_size: u32,
    pub request_timeout_secs: u64,
    /// Upper bound on pages per chunked fetch
    pub max_pages: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            base_url: "https://api.binance.com/api/v3".to_string(),
            min_request_interval_ms: 100,
            page_size: 1000,
            request_timeout_secs: 30,
            max_pages: 10_000,
        }
    }
}

impl ExchangeConfig {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Incremental update defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Bars re-fetched before the last stored candle
    pub overlap: u32,
    /// History fetched when no series exists yet
    pub lookback_days: u32,
    /// Fetch up to now instead of the end of yesterday
    pub include_now: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        UpdateConfig {
            overlap: 1,
            lookback_days: 365,
            include_now: false,
        }
    }
}

/// Bundle archive settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    pub dir: PathBuf,
    pub base_url: String,
    /// Pause between bundle downloads
    pub pause_ms: u64,
}

impl Default for BundleConfig {
    fn default() -> Self {
        BundleConfig {
            dir: PathBuf::from("bundles"),
            base_url: "https://data.binance.vision/data/spot".to_string(),
            pause_ms: 50,
        }
    }
}

/// Summary report settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output: PathBuf,
    pub timeframes: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            output: PathBuf::from("results/data_onepager.md"),
            timeframes: vec!["1h".to_string(), "1d".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.quote, "USDT");
        assert_eq!(config.exchange.page_size, 1000);
        assert_eq!(config.exchange.min_request_interval(), Duration::from_millis(100));
        assert_eq!(config.update.overlap, 1);
        assert!(!config.update.include_now);
        assert_eq!(config.report.timeframes, vec!["1h", "1d"]);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "data_dir": "/srv/market", "update": { "overlap": 3 } }"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/market"));
        assert_eq!(config.update.overlap, 3);
        assert_eq!(config.update.lookback_days, 365);
        assert_eq!(config.exchange.max_pages, 10_000);
        assert_eq!(config.bundles.pause_ms, 50);
    }

    #[test]
    fn test_bad_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::from_file(&path).is_err());
        assert!(Config::from_file(dir.path().join("missing.json")).is_err());
    }
}
