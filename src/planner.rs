//! Incremental resume planning.
//!
//! Pure functions: the caller passes `now` in.

use chrono::{DateTime, Duration, Utc};

use crate::error::{DataError, DataResult};
use crate::Timeframe;

/// Where an incremental update should start and stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePlan {
    pub since: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// `true` when resuming from stored data, `false` on a cold start
    pub resumed: bool,
}

/// Resume point: `overlap` bars before the last stored candle, or
/// `now - lookback` when nothing is stored yet.
///
/// Fails with [`DataError::OutOfRange`] when the step back leaves the
/// representable date range.
pub fn plan_since(
    last_stored: Option<DateTime<Utc>>,
    timeframe: &Timeframe,
    overlap: u32,
    lookback: Duration,
    now: DateTime<Utc>,
) -> DataResult<DateTime<Utc>> {
    let (from, back) = match last_stored {
        Some(last) => {
            let back = i32::try_from(overlap)
                .ok()
                .and_then(|n| timeframe.duration().checked_mul(n));
            (last, back)
        }
        None => (now, Some(lookback)),
    };

    back.and_then(|d| from.checked_sub_signed(d)).ok_or_else(|| {
        DataError::OutOfRange(format!(
            "cannot step back {} x {} (lookback {}) from {}",
            overlap, timeframe, lookback, from
        ))
    })
}

/// Last instant of yesterday (UTC), one millisecond before today's midnight
pub fn end_of_yesterday(now: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|ndt| ndt.and_utc())
        .unwrap_or(now);
    midnight - Duration::milliseconds(1)
}

/// End of the update window. Excluding today avoids writing a partial bar.
pub fn window_end(now: DateTime<Utc>, include_now: bool) -> DateTime<Utc> {
    if include_now {
        now
    } else {
        end_of_yesterday(now)
    }
}

pub fn plan_update(
    last_stored: Option<DateTime<Utc>>,
    timeframe: &Timeframe,
    overlap: u32,
    lookback: Duration,
    include_now: bool,
    now: DateTime<Utc>,
) -> DataResult<ResumePlan> {
    Ok(ResumePlan {
        since: plan_since(last_stored, timeframe, overlap, lookback, now)?,
        end: window_end(now, include_now),
        resumed: last_stored.is_some(),
    })
}
