//! Crypto OHLCV data pipeline
//!
//! Fetches candles from Binance, keeps them as partitioned CSV files with
//! YAML manifests, imports pre-downloaded Binance kline bundles, and builds
//! summary reports of the stored dataset.

pub mod binance;
pub mod bundle;
pub mod common;
pub mod config;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod merge;
pub mod partition;
pub mod pipeline;
pub mod planner;
pub mod report;
pub mod series;
pub mod storage;
pub mod types;
pub mod validate;

pub use config::Config;
pub use error::DataError;
pub use series::Series;
pub use types::*;
