use sqlx::PgPool;

/// Best-effort status row for operator visibility. Callers log failures and
/// move on; a status write must never fail a run.
pub async fn record_run(
    pool: &PgPool,
    pipeline_name: &str,
    status: &str,
    message: Option<&str>,
    rows_loaded: Option<i32>,
) -> Result<(), sqlx::Error> {
    let message = message.map(|m| m.chars().take(1000).collect::<String>());

    sqlx::query(
        r#"
        INSERT INTO pipeline_status
            (pipeline_name, last_run_at, status, message, rows_loaded)
        VALUES ($1, now(), $2, $3, $4)
        ON CONFLICT (pipeline_name) DO UPDATE
            SET last_run_at = excluded.last_run_at,
                status = excluded.status,
                message = excluded.message,
                rows_loaded = excluded.rows_loaded
        "#,
    )
    .bind(pipeline_name)
    .bind(status)
    .bind(message)
    .bind(rows_loaded)
    .execute(pool)
    .await?;
    Ok(())
}
