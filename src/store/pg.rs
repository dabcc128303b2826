use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;

use crate::db;
use crate::errors::AppError;
use crate::models::{HourRecord, TimeRange, Watermark};
use crate::store::IngestStore;

/// Postgres-backed store, scoped to a single Tibber home.
pub struct PgIngestStore {
    pool: PgPool,
    home_id: String,
}

impl PgIngestStore {
    pub fn new(pool: PgPool, home_id: String) -> Self {
        Self { pool, home_id }
    }
}

#[async_trait]
impl IngestStore for PgIngestStore {
    async fn upsert_hours(&self, records: &[HourRecord]) -> Result<(), AppError> {
        db::hour_queries::upsert_hours(&self.pool, &self.home_id, records)
            .await
            .map_err(AppError::Db)
    }

    async fn list_timestamps(
        &self,
        window: &TimeRange,
    ) -> Result<HashSet<DateTime<Utc>>, AppError> {
        db::hour_queries::list_timestamps(&self.pool, &self.home_id, window)
            .await
            .map_err(AppError::Db)
    }

    async fn get_watermark(&self) -> Result<Option<Watermark>, AppError> {
        db::watermark_queries::fetch(&self.pool, &self.home_id)
            .await
            .map_err(AppError::Db)
    }

    async fn set_watermark(&self, last_complete_hour: DateTime<Utc>) -> Result<(), AppError> {
        db::watermark_queries::advance(&self.pool, &self.home_id, last_complete_hour)
            .await
            .map_err(AppError::Db)
    }
}
