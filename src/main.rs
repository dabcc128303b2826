mod config;
mod db;
mod errors;
mod external;
mod logging;
mod models;
mod services;
mod store;

use anyhow::Context;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Cli;
use crate::external::tibber::TibberProvider;
use crate::services::fetch_executor::{FetchExecutor, RetryPolicy};
use crate::services::orchestrator::{IngestOrchestrator, RunOutcome, RunReport};
use crate::store::pg::PgIngestStore;

const PIPELINE_NAME: &str = "tibber";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    logging::init_logging(logging::LoggingConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let database_url = std::env::var("DATABASE_URL")
        .or_else(|_| std::env::var("SUPABASE_DATABASE_URL"))
        .context("DATABASE_URL is not set")?;
    let token = std::env::var("TIBBER_TOKEN").context("TIBBER_TOKEN is not set")?;
    let home_id = std::env::var("TIBBER_HOME_ID").context("TIBBER_HOME_ID is not set")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    db::schema::ensure_schema(&pool).await?;

    let provider = Arc::new(
        TibberProvider::new(token, home_id.clone())
            .map_err(|e| anyhow::anyhow!("failed to create Tibber provider: {}", e))?,
    );
    let store = Arc::new(PgIngestStore::new(pool.clone(), home_id));

    let mode = cli.mode()?;
    let policy = RetryPolicy {
        max_retries: cli.max_retries,
        backoff_base_secs: cli.backoff_base_secs,
    };
    let orchestrator = IngestOrchestrator::new(
        store,
        FetchExecutor::new(provider, policy),
        cli.chunk_hours,
        cli.offset_hours,
    );

    info!("🚀 Starting ingestion run: {:?}", mode);
    match orchestrator.run(mode, chrono::Utc::now()).await {
        Ok(report) => {
            log_summary(&report);
            let (status, message) = summarize(&report);
            if let Err(e) = db::run_status_queries::record_run(
                &pool,
                PIPELINE_NAME,
                status,
                Some(&message),
                Some(report.rows_loaded as i32),
            )
            .await
            {
                warn!("Status write failed: {}", e);
            }

            if matches!(report.outcome, RunOutcome::PartiallySucceeded(_)) {
                // Non-zero exit so external schedulers can alert.
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            error!("Ingestion run aborted: {}", e);
            if let Err(status_err) =
                db::run_status_queries::record_run(&pool, PIPELINE_NAME, "failed", Some(&e.to_string()), None)
                    .await
            {
                warn!("Status write failed: {}", status_err);
            }
            Err(e.into())
        }
    }
}

fn log_summary(report: &RunReport) {
    for range in &report.succeeded {
        info!("Succeeded: {}", range);
    }
    for failed in report.failed() {
        error!("Failed: {} ({})", failed.range, failed.reason);
    }
    match &report.watermark {
        Some(wm) => info!("Watermark: {}", wm),
        None => info!("Watermark: none"),
    }
    info!("Rows loaded: {}", report.rows_loaded);
}

fn summarize(report: &RunReport) -> (&'static str, String) {
    match &report.outcome {
        RunOutcome::FullySucceeded => (
            "success",
            format!("{} range(s) ingested", report.succeeded.len()),
        ),
        RunOutcome::NothingToDo => ("success", "nothing to do".to_string()),
        RunOutcome::PartiallySucceeded(failed) => {
            let ranges = failed
                .iter()
                .map(|f| format!("{} ({})", f.range, f.reason))
                .collect::<Vec<_>>()
                .join("; ");
            ("partial", format!("failed ranges: {}", ranges))
        }
    }
}
