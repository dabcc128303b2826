use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::Watermark;

pub async fn fetch(pool: &PgPool, home_id: &str) -> Result<Option<Watermark>, sqlx::Error> {
    sqlx::query_as::<_, Watermark>(
        "SELECT last_complete_hour, updated_at FROM ingest_watermark WHERE home_id = $1",
    )
    .bind(home_id)
    .fetch_optional(pool)
    .await
}

/// Upsert the watermark. `GREATEST` keeps the stored value monotonic even if
/// two invocations accidentally overlap.
pub async fn advance(
    pool: &PgPool,
    home_id: &str,
    last_complete_hour: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO ingest_watermark (home_id, last_complete_hour, updated_at)
        VALUES ($1, $2, now())
        ON CONFLICT (home_id)
        DO UPDATE SET
            last_complete_hour = GREATEST(ingest_watermark.last_complete_hour, EXCLUDED.last_complete_hour),
            updated_at = now()
        "#,
    )
    .bind(home_id)
    .bind(last_complete_hour)
    .execute(pool)
    .await?;
    Ok(())
}
