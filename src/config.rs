use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::Parser;

use crate::errors::AppError;
use crate::models::truncate_to_hour;
use crate::services::orchestrator::IngestMode;

/// Ingest Tibber hourly price and consumption data into Postgres.
#[derive(Debug, Parser)]
#[command(name = "tibber-ingest", version, about)]
pub struct Cli {
    /// Start datetime (YYYY-MM-DD or RFC 3339); selects backfill mode.
    #[arg(long, env = "TIBBER_START")]
    pub start: Option<String>,

    /// Optional backfill end bound; defaults to now minus the offset.
    #[arg(long, env = "TIBBER_END")]
    pub end: Option<String>,

    /// Resume from the last loaded timestamp in the destination.
    #[arg(long, env = "TIBBER_RESUME")]
    pub resume: bool,

    /// Repair gaps over the trailing latest-hours window.
    #[arg(long, env = "TIBBER_SELF_HEAL")]
    pub self_heal: bool,

    /// Width of the self-heal window in hours.
    #[arg(long, env = "TIBBER_LATEST_HOURS", default_value_t = 24)]
    pub latest_hours: i64,

    /// Hours to hold back from now; Tibber publishes with a lag and the most
    /// recent hours come back incomplete.
    #[arg(long, env = "TIBBER_OFFSET_HOURS", default_value_t = 0)]
    pub offset_hours: i64,

    /// Chunk size in hours for range pulls.
    #[arg(long, env = "TIBBER_CHUNK_HOURS", default_value_t = 168)]
    pub chunk_hours: i64,

    /// Retries per chunk after the first attempt, transient failures only.
    #[arg(long, env = "TIBBER_MAX_RETRIES", default_value_t = 6)]
    pub max_retries: u32,

    /// Exponential backoff base in seconds.
    #[arg(long, env = "TIBBER_BACKOFF_BASE_SECS", default_value_t = 2.0)]
    pub backoff_base_secs: f64,

    /// Backfill start used by the first resume run, before any watermark
    /// exists.
    #[arg(long, env = "TIBBER_DEFAULT_START", default_value = "2024-09-01")]
    pub default_start: String,
}

impl Cli {
    /// Mode precedence: self-heal, then resume, then explicit backfill.
    /// Resume outranks --start; the start date is only the first-run
    /// fallback.
    pub fn mode(&self) -> Result<IngestMode, AppError> {
        if self.self_heal {
            return Ok(IngestMode::SelfHeal {
                latest_hours: self.latest_hours,
            });
        }
        if self.resume {
            let default_start = match &self.start {
                Some(s) => parse_start(s)?,
                None => parse_start(&self.default_start)?,
            };
            return Ok(IngestMode::Resume { default_start });
        }
        let start = self.start.as_deref().ok_or_else(|| {
            AppError::Config("one of --start, --resume or --self-heal is required".into())
        })?;
        Ok(IngestMode::Backfill {
            start: parse_start(start)?,
            end: self.end.as_deref().map(parse_start).transpose()?,
        })
    }
}

/// Accepts a bare date (midnight UTC) or a full RFC 3339 datetime, truncated
/// to the containing hour.
pub fn parse_start(value: &str) -> Result<DateTime<Utc>, AppError> {
    if value.contains('T') {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| truncate_to_hour(dt.with_timezone(&Utc)))
            .map_err(|e| AppError::Config(format!("invalid datetime {:?}: {}", value, e)))
    } else {
        let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|e| AppError::Config(format!("invalid date {:?}: {}", value, e)))?;
        Ok(date.and_time(NaiveTime::MIN).and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("tibber-ingest").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_bare_date() {
        assert_eq!(
            parse_start("2025-09-01").unwrap(),
            Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_datetime_with_offset() {
        // 06:30+02:00 is 04:30 UTC, truncated to 04:00.
        assert_eq!(
            parse_start("2025-09-01T06:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2025, 9, 1, 4, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_start("soon"), Err(AppError::Config(_))));
        assert!(matches!(
            parse_start("2025-13-40"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_backfill_requires_start() {
        assert!(matches!(cli(&[]).mode(), Err(AppError::Config(_))));
        assert!(matches!(
            cli(&["--start", "2025-09-01"]).mode(),
            Ok(IngestMode::Backfill { .. })
        ));
    }

    #[test]
    fn test_self_heal_outranks_resume_and_start() {
        let mode = cli(&["--self-heal", "--resume", "--start", "2025-09-01"])
            .mode()
            .unwrap();
        assert!(matches!(mode, IngestMode::SelfHeal { latest_hours: 24 }));
    }

    #[test]
    fn test_resume_outranks_start() {
        let mode = cli(&["--resume", "--start", "2025-09-01"]).mode().unwrap();
        match mode {
            IngestMode::Resume { default_start } => {
                assert_eq!(
                    default_start,
                    Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap()
                );
            }
            other => panic!("expected resume, got {:?}", other),
        }
    }
}
