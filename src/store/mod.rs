#[cfg(test)]
pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::errors::AppError;
use crate::models::{HourRecord, TimeRange, Watermark};

/// Storage seam for the ingestion loop. The backing store is external; this
/// trait is the access contract, keeping the orchestrator testable against an
/// in-memory implementation.
#[async_trait]
pub trait IngestStore: Send + Sync {
    /// Idempotent upsert keyed by hour timestamp.
    async fn upsert_hours(&self, records: &[HourRecord]) -> Result<(), AppError>;

    /// Timestamps already persisted inside `[window.start, window.end)`.
    async fn list_timestamps(
        &self,
        window: &TimeRange,
    ) -> Result<HashSet<DateTime<Utc>>, AppError>;

    async fn get_watermark(&self) -> Result<Option<Watermark>, AppError>;

    /// Callers guarantee monotonically non-decreasing values; implementations
    /// must additionally refuse to move the watermark backward.
    async fn set_watermark(&self, last_complete_hour: DateTime<Utc>) -> Result<(), AppError>;
}
