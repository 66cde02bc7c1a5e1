//! Merge-and-dedup of candle series.
//!
//! Incoming candles overwrite existing ones on the same timestamp; the result
//! is always sorted with one candle per timestamp.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::{Candle, Series};

/// Counts describing what a merge did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Rows in the existing series
    pub existing: usize,
    /// Rows in the incoming series
    pub incoming: usize,
    /// Incoming rows with a timestamp not present before
    pub added: usize,
    /// Incoming rows that replaced an existing timestamp
    pub replaced: usize,
    /// Rows in the merged series
    pub rows: usize,
}

/// Merge `incoming` into `existing`, new wins on duplicate timestamps
pub fn merge_series(existing: &Series, incoming: &Series) -> (Series, MergeReport) {
    let mut by_time: BTreeMap<DateTime<Utc>, Candle> =
        existing.iter().map(|c| (c.datetime, c.clone())).collect();

    let mut added = 0;
    let mut replaced = 0;
    for candle in incoming {
        match by_time.insert(candle.datetime, candle.clone()) {
            Some(_) => replaced += 1,
            None => added += 1,
        }
    }

    let merged = Series::from_unsorted(by_time.into_values());
    let report = MergeReport {
        existing: existing.len(),
        incoming: incoming.len(),
        added,
        replaced,
        rows: merged.len(),
    };

    (merged, report)
}
