use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The timestamp through which ingestion is known fully complete.
///
/// Singleton per home, written only by the orchestrator after every hour of a
/// chunk is confirmed persisted, and never moved backward. Moving it backward
/// would only cause redundant re-fetch (upserts are idempotent), but the store
/// guards against it anyway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, FromRow)]
pub struct Watermark {
    pub last_complete_hour: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
