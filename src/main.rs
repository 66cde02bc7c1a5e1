//! Crypto data pipeline - main entry point
//!
//! Subcommands:
//! - fetch: download history from Binance into canonical CSVs
//! - update: incremental update of stored series
//! - import-bundles: load local Binance bundle archives into month partitions
//! - download-bundles: fetch Binance public bundle archives
//! - partition: split canonical series into month partitions
//! - report: markdown one-pager and CSV summaries
//! - validate: check stored series, save the report and summary statistics

use anyhow::Result;
use clap::{Parser, Subcommand};
use crypto_data::Config;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "crypto-data")]
#[command(about = "Crypto OHLCV fetching, bundle import and partitioned storage", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data root (overrides config and CRYPTO_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch history from Binance and merge into stored series
    Fetch {
        /// Symbols, e.g. BTC ETH/USDT SOLUSDT (default: five majors)
        symbols: Vec<String>,

        /// Timeframe, e.g. "1m", "1h", "1d"
        #[arg(short, long, default_value = "1h")]
        timeframe: String,

        /// Days of history to fetch
        #[arg(long, default_value = "365")]
        days_back: u32,

        /// Fetch only the N most recent candles in a single request
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Incrementally update stored series to the latest bar
    Update {
        /// Symbols to update (default: five majors)
        symbols: Vec<String>,

        #[arg(short, long, default_value = "1d")]
        timeframe: String,

        /// Bars to re-fetch before the last stored candle
        #[arg(long)]
        overlap: Option<u32>,

        /// Days to fetch when no series exists yet
        #[arg(long)]
        lookback_days: Option<u32>,

        /// Include today's (possibly partial) bar
        #[arg(long)]
        include_today: bool,
    },

    /// Import local Binance bundle archives into month partitions
    ImportBundles {
        /// Directory holding bundle files (searched recursively)
        #[arg(long)]
        bundle_dir: Option<PathBuf>,

        #[arg(short, long, default_value = "1m")]
        timeframe: String,

        /// Symbols to import (default: every symbol found)
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,

        /// Decode and merge without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Replace existing partitions instead of merging into them
        #[arg(long)]
        force: bool,
    },

    /// Split canonical series into month partitions with yearly roll-ups
    Partition {
        /// Symbols to partition (default: every stored symbol)
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,

        #[arg(short, long, default_value = "1m")]
        timeframe: String,

        /// Split and merge without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Replace existing partitions instead of merging into them
        #[arg(long)]
        force: bool,
    },

    /// Download Binance public kline bundles
    DownloadBundles {
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,

        #[arg(short, long, default_value = "1m")]
        timeframe: String,

        /// "daily" or "monthly"
        #[arg(long, default_value = "daily")]
        period: String,

        /// Days back from the end date when no start date is given
        #[arg(long, default_value = "30")]
        days_back: u32,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,

        /// End date (YYYY-MM-DD, default: yesterday)
        #[arg(long)]
        end_date: Option<String>,

        #[arg(long)]
        bundle_dir: Option<PathBuf>,

        #[arg(long)]
        dry_run: bool,

        /// Re-download files that already exist
        #[arg(long)]
        force: bool,
    },

    /// Generate the markdown one-pager and CSV summaries
    Report {
        /// Output markdown path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate stored series and save the report and summary statistics
    Validate {
        /// Symbols to validate (default: every stored symbol)
        symbols: Vec<String>,

        #[arg(short, long, default_value = "1d")]
        timeframe: String,

        /// Where to write the report files (default: data root)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // File layer - same format but without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Fetch { .. } => "fetch",
        Commands::Update { .. } => "update",
        Commands::ImportBundles { .. } => "import_bundles",
        Commands::Partition { .. } => "partition",
        Commands::DownloadBundles { .. } => "download_bundles",
        Commands::Report { .. } => "report",
        Commands::Validate { .. } => "validate",
    };

    setup_logging(cli.verbose, command_name)?;

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    info!("Data root: {}", config.data_dir.display());

    match cli.command {
        Commands::Fetch {
            symbols,
            timeframe,
            days_back,
            limit,
        } => commands::fetch::run(&config, symbols, timeframe, days_back, limit),

        Commands::Update {
            symbols,
            timeframe,
            overlap,
            lookback_days,
            include_today,
        } => commands::update::run(
            &config,
            symbols,
            timeframe,
            overlap,
            lookback_days,
            include_today,
        ),

        Commands::ImportBundles {
            bundle_dir,
            timeframe,
            symbols,
            dry_run,
            force,
        } => commands::import_bundles::run(&config, bundle_dir, timeframe, symbols, dry_run, force),

        Commands::Partition {
            symbols,
            timeframe,
            dry_run,
            force,
        } => commands::partition::run(&config, symbols, timeframe, dry_run, force),

        Commands::DownloadBundles {
            symbols,
            timeframe,
            period,
            days_back,
            start_date,
            end_date,
            bundle_dir,
            dry_run,
            force,
        } => commands::download_bundles::run(
            &config,
            symbols,
            timeframe,
            period,
            days_back,
            start_date,
            end_date,
            bundle_dir,
            dry_run,
            force,
        ),

        Commands::Report { output } => commands::report::run(&config, output),

        Commands::Validate {
            symbols,
            timeframe,
            output_dir,
        } => commands::validate::run(&config, symbols, timeframe, output_dir),
    }
}
