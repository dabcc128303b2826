use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};

use crate::errors::AppError;
use crate::models::{HourRecord, TimeRange, Watermark};
use crate::store::IngestStore;

/// In-memory store used by orchestrator and service tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    hours: BTreeMap<DateTime<Utc>, HourRecord>,
    watermark: Option<Watermark>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.inner.lock().hours.len()
    }

    pub fn record(&self, ts: DateTime<Utc>) -> Option<HourRecord> {
        self.inner.lock().hours.get(&ts).cloned()
    }

    pub fn watermark_value(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().watermark.map(|w| w.last_complete_hour)
    }
}

#[async_trait]
impl IngestStore for MemoryStore {
    async fn upsert_hours(&self, records: &[HourRecord]) -> Result<(), AppError> {
        let mut inner = self.inner.lock();
        for r in records {
            inner.hours.insert(r.hour_ts, r.clone());
        }
        Ok(())
    }

    async fn list_timestamps(
        &self,
        window: &TimeRange,
    ) -> Result<HashSet<DateTime<Utc>>, AppError> {
        let inner = self.inner.lock();
        Ok(inner
            .hours
            .range(window.start..window.end)
            .map(|(ts, _)| *ts)
            .collect())
    }

    async fn get_watermark(&self) -> Result<Option<Watermark>, AppError> {
        Ok(self.inner.lock().watermark)
    }

    async fn set_watermark(&self, last_complete_hour: DateTime<Utc>) -> Result<(), AppError> {
        let mut inner = self.inner.lock();
        let advanced = match inner.watermark {
            Some(w) => w.last_complete_hour.max(last_complete_hour),
            None => last_complete_hour,
        };
        inner.watermark = Some(Watermark {
            last_complete_hour: advanced,
            updated_at: Utc::now(),
        });
        Ok(())
    }
}
