use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::AppError;

/// Half-open, hour-aligned interval `[start, end)` in UTC.
///
/// Tibber publishes hourly records keyed by the interval start time, so every
/// range the pipeline works with starts and ends on an hour boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, AppError> {
        if start >= end {
            return Err(AppError::InvalidRange(format!(
                "start {} must be before end {}",
                start, end
            )));
        }
        if !is_hour_aligned(start) || !is_hour_aligned(end) {
            return Err(AppError::InvalidRange(format!(
                "range [{}, {}) is not aligned to hour boundaries",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn hours(&self) -> i64 {
        (self.end - self.start).num_hours()
    }

    /// Hour boundaries covered by the range, ascending. One entry per
    /// expected record.
    pub fn hour_grid(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        let start = self.start;
        (0..self.hours()).map(move |h| start + Duration::hours(h))
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

pub fn is_hour_aligned(ts: DateTime<Utc>) -> bool {
    ts.minute() == 0 && ts.second() == 0 && ts.nanosecond() == 0
}

/// Round down to the containing hour boundary.
pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts - Duration::minutes(ts.minute() as i64)
        - Duration::seconds(ts.second() as i64)
        - Duration::nanoseconds(ts.nanosecond() as i64)
}
