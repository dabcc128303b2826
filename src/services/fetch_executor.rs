use rand::Rng;
use std::sync::Arc;
use tokio::time::{sleep as async_sleep, Duration};
use tracing::warn;

use crate::external::energy_provider::{EnergyProvider, ProviderError};
use crate::models::{Chunk, ChunkStatus, HourRecord};

/// Classified result of fetching one chunk.
#[derive(Debug)]
pub enum FetchOutcome {
    Success(Vec<HourRecord>),
    TransientFailure(String),
    PermanentFailure(String),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt, transient failures only.
    pub max_retries: u32,
    /// Exponential backoff base in seconds; delay is base^n plus jitter.
    pub backoff_base_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            backoff_base_secs: 2.0,
        }
    }
}

impl RetryPolicy {
    fn delay(&self, completed_attempts: u32) -> Duration {
        if self.backoff_base_secs <= 0.0 {
            return Duration::ZERO;
        }
        let jitter: f64 = rand::thread_rng().gen_range(0.0..0.5);
        Duration::from_secs_f64(
            self.backoff_base_secs.powi(completed_attempts as i32 - 1) + jitter,
        )
    }
}

/// Drives one chunk's request against the provider and classifies the
/// outcome. Purely fetch-and-classify: persistence stays with the
/// orchestrator, so this unit tests without a store.
pub struct FetchExecutor {
    provider: Arc<dyn EnergyProvider>,
    policy: RetryPolicy,
}

impl FetchExecutor {
    pub fn new(provider: Arc<dyn EnergyProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    /// A response covering only a subset of the chunk's hours is still a
    /// success; the remainder stays a gap for the next self-heal pass.
    pub async fn execute(&self, chunk: &mut Chunk) -> FetchOutcome {
        chunk.status = ChunkStatus::Fetching;
        loop {
            chunk.attempt_count += 1;
            match self.provider.fetch_hours(&chunk.range).await {
                Ok(points) => {
                    chunk.status = ChunkStatus::Succeeded;
                    let records = points
                        .into_iter()
                        .map(|p| HourRecord {
                            hour_ts: p.hour_ts,
                            price: p.unit_price,
                            consumption: p.consumption,
                            cost: p.cost,
                            currency: p.currency,
                            source_chunk_id: chunk.id,
                        })
                        .collect();
                    return FetchOutcome::Success(records);
                }
                Err(e) if e.is_transient() && chunk.attempt_count <= self.policy.max_retries => {
                    let delay = self.policy.delay(chunk.attempt_count);
                    warn!(
                        "Transient failure for chunk {} (attempt {}/{}), retrying in {:.1}s: {}",
                        chunk.range,
                        chunk.attempt_count,
                        self.policy.max_retries + 1,
                        delay.as_secs_f64(),
                        e
                    );
                    async_sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    chunk.status = ChunkStatus::Failed;
                    return FetchOutcome::TransientFailure(e.to_string());
                }
                Err(e) => {
                    chunk.status = ChunkStatus::Failed;
                    return FetchOutcome::PermanentFailure(e.to_string());
                }
            }
        }
    }
}
