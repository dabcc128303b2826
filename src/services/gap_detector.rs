use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::errors::AppError;
use crate::models::TimeRange;

/// Compare the expected hourly grid over `window` against the timestamps
/// already persisted and return the maximal contiguous missing sub-ranges,
/// oldest first. An empty result means the window is fully populated, which
/// is the termination condition for self-heal.
pub fn find_gaps(
    window: &TimeRange,
    present: &HashSet<DateTime<Utc>>,
) -> Result<Vec<TimeRange>, AppError> {
    let mut gaps = Vec::new();
    let mut gap_start: Option<DateTime<Utc>> = None;

    for hour in window.hour_grid() {
        if present.contains(&hour) {
            if let Some(start) = gap_start.take() {
                gaps.push(TimeRange::new(start, hour)?);
            }
        } else if gap_start.is_none() {
            gap_start = Some(hour);
        }
    }
    if let Some(start) = gap_start {
        gaps.push(TimeRange::new(start, window.end)?);
    }

    Ok(gaps)
}
