use sqlx::PgPool;

// Startup DDL, idempotent. The pipeline owns its own tables the same way it
// owns its status row.
const CREATE_CONSUMPTION_HOURS: &str = r#"
    CREATE TABLE IF NOT EXISTS consumption_hours (
        home_id text NOT NULL,
        hour_ts timestamptz NOT NULL,
        price numeric,
        consumption numeric,
        cost numeric,
        currency text,
        source_chunk_id uuid NOT NULL,
        updated_at timestamptz NOT NULL DEFAULT now(),
        PRIMARY KEY (home_id, hour_ts)
    )
"#;

const CREATE_INGEST_WATERMARK: &str = r#"
    CREATE TABLE IF NOT EXISTS ingest_watermark (
        home_id text PRIMARY KEY,
        last_complete_hour timestamptz NOT NULL,
        updated_at timestamptz NOT NULL
    )
"#;

const CREATE_PIPELINE_STATUS: &str = r#"
    CREATE TABLE IF NOT EXISTS pipeline_status (
        pipeline_name text PRIMARY KEY,
        last_run_at timestamptz NOT NULL,
        status text NOT NULL,
        message text,
        rows_loaded integer
    )
"#;

pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_CONSUMPTION_HOURS).execute(pool).await?;
    sqlx::query(CREATE_INGEST_WATERMARK).execute(pool).await?;
    sqlx::query(CREATE_PIPELINE_STATUS).execute(pool).await?;
    Ok(())
}
