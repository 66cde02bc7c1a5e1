//! Report command: markdown one-pager and CSV summaries

use anyhow::Result;
use chrono::Utc;
use crypto_data::report::generate_report;
use crypto_data::storage::DataLayout;
use crypto_data::{Config, Timeframe};
use std::path::PathBuf;

pub fn run(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| config.report.output.clone());
    let timeframes = config
        .report
        .timeframes
        .iter()
        .map(|s| s.parse::<Timeframe>())
        .collect::<Result<Vec<_>, _>>()?;

    let layout = DataLayout::new(&config.data_dir);
    let out = generate_report(&layout, &config.quote, &timeframes, &output, Utc::now())?;

    println!("Wrote one-pager to: {}", out.markdown.display());
    for path in &out.csv {
        println!("Wrote summary to:   {}", path.display());
    }
    Ok(())
}
