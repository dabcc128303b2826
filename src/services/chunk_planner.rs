use chrono::Duration;

use crate::errors::AppError;
use crate::models::TimeRange;

/// Split `range` into consecutive sub-ranges of at most `max_chunk_hours`
/// each; the final sub-range may be shorter. Output is chronological, so
/// partial progress is always resumable from the earliest incomplete chunk.
pub fn plan(range: &TimeRange, max_chunk_hours: i64) -> Result<Vec<TimeRange>, AppError> {
    if max_chunk_hours <= 0 {
        return Err(AppError::InvalidRange(format!(
            "chunk width must be positive, got {}",
            max_chunk_hours
        )));
    }

    let mut chunks = Vec::new();
    let mut current = range.start;
    while current < range.end {
        let chunk_end = std::cmp::min(current + Duration::hours(max_chunk_hours), range.end);
        chunks.push(TimeRange::new(current, chunk_end)?);
        current = chunk_end;
    }
    Ok(chunks)
}
