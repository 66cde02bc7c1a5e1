//! Binance integration: REST kline client and public bundle downloader.
//! No API key needed for public market data endpoints.

pub mod bundles;
mod client;
mod types;

pub use bundles::{BundleDownload, BundleDownloader, BundlePeriod, DownloadSummary};
pub use client::{BinanceClient, MAX_KLINES_PER_REQUEST};
pub use types::*;
