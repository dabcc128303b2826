use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::error;

use crate::models::{HourRecord, TimeRange};

pub async fn upsert_hours(
    pool: &PgPool,
    home_id: &str,
    records: &[HourRecord],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await.map_err(|e| {
        error!("Failed to begin transaction for home {}: {}", home_id, e);
        e
    })?;

    for r in records {
        if let Err(e) = sqlx::query(
            r#"
            INSERT INTO consumption_hours
                (home_id, hour_ts, price, consumption, cost, currency, source_chunk_id, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, now())
            ON CONFLICT (home_id, hour_ts)
            DO UPDATE SET
                price = EXCLUDED.price,
                consumption = EXCLUDED.consumption,
                cost = EXCLUDED.cost,
                currency = EXCLUDED.currency,
                source_chunk_id = EXCLUDED.source_chunk_id,
                updated_at = now()
            "#,
        )
        .bind(home_id)
        .bind(r.hour_ts)
        .bind(&r.price)
        .bind(&r.consumption)
        .bind(&r.cost)
        .bind(&r.currency)
        .bind(r.source_chunk_id)
        .execute(&mut *tx)
        .await
        {
            error!(
                "Failed to upsert hour {} for home {}: {}",
                r.hour_ts, home_id, e
            );
            return Err(e);
        }
    }

    tx.commit().await.map_err(|e| {
        error!("Failed to commit upsert for home {}: {}", home_id, e);
        e
    })?;
    Ok(())
}

/// Timestamps already persisted inside `[window.start, window.end)`, for gap
/// detection and chunk-completeness checks.
pub async fn list_timestamps(
    pool: &PgPool,
    home_id: &str,
    window: &TimeRange,
) -> Result<HashSet<DateTime<Utc>>, sqlx::Error> {
    let rows = sqlx::query_scalar::<_, DateTime<Utc>>(
        r#"
        SELECT hour_ts
        FROM consumption_hours
        WHERE home_id = $1
          AND hour_ts >= $2
          AND hour_ts < $3
        "#,
    )
    .bind(home_id)
    .bind(window.start)
    .bind(window.end)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}
