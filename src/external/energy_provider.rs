use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::TimeRange;

/// One hour as returned by the provider, before it is stamped with the chunk
/// that requested it.
#[derive(Debug, Clone)]
pub struct ExternalHourPoint {
    pub hour_ts: DateTime<Utc>,
    pub consumption: Option<BigDecimal>,
    pub cost: Option<BigDecimal>,
    pub unit_price: Option<BigDecimal>,
    pub currency: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited")]
    RateLimited,

    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("range not available: {0}")]
    RangeUnavailable(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Transient failures get retried with backoff; everything else is a
    /// permanent per-chunk failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Network(_)
                | ProviderError::Timeout
                | ProviderError::RateLimited
                | ProviderError::Server { .. }
        )
    }
}

/// Thin request/response transport to the provider. May fail transiently or
/// permanently, and may return a strict subset of the requested hours.
#[async_trait]
pub trait EnergyProvider: Send + Sync {
    async fn fetch_hours(
        &self,
        range: &TimeRange,
    ) -> Result<Vec<ExternalHourPoint>, ProviderError>;
}
