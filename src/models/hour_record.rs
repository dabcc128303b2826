use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// One hour of provider data, keyed by the interval start timestamp.
// Re-persisting an existing key overwrites it, so re-ingestion is always safe.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HourRecord {
    pub hour_ts: DateTime<Utc>,
    pub price: Option<BigDecimal>,
    pub consumption: Option<BigDecimal>,
    pub cost: Option<BigDecimal>,
    pub currency: Option<String>,
    pub source_chunk_id: Uuid,
}
