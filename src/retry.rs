//! Retry controller for batch attempts.
//!
//! Executes one batch against the external collaborator, retrying transient
//! failures up to a bound with a pacing delay between attempts. Exhausted
//! batches are reported, never raised: one bad batch does not abort the run.
//! An inter-batch pacing delay bounds the request rate to the collaborator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::batch::Batch;
use crate::service::{BatchService, ItemResult, ResponseParser};

/// Outcome of a single attempt against the collaborator.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// One result per batch item, in batch order.
    Success(Vec<ItemResult>),
    /// Likely to succeed on retry (transport failure, empty or malformed response).
    TransientFailure(String),
    /// Definitive rejection; retrying is pointless.
    PermanentFailure(String),
}

/// One attempt against the external collaborator.
///
/// Implementations classify the raw service outcome; the retry controller
/// only decides whether and when to try again.
#[async_trait]
pub trait BatchFetcher: Send + Sync {
    async fn attempt(&self, batch: &Batch) -> AttemptOutcome;
}

/// Fetcher that calls a [`BatchService`] and classifies the result.
pub struct ServiceFetcher {
    service: Arc<dyn BatchService>,
    parser: Arc<dyn ResponseParser>,
}

impl ServiceFetcher {
    pub fn new(service: Arc<dyn BatchService>, parser: Arc<dyn ResponseParser>) -> Self {
        Self { service, parser }
    }
}

#[async_trait]
impl BatchFetcher for ServiceFetcher {
    async fn attempt(&self, batch: &Batch) -> AttemptOutcome {
        match self.service.fetch(batch).await {
            Ok(body) if body.trim().is_empty() => {
                AttemptOutcome::TransientFailure("empty response body".to_string())
            }
            Ok(body) => match self.parser.parse(batch, &body) {
                Some(results) => AttemptOutcome::Success(results),
                None => {
                    AttemptOutcome::TransientFailure("unrecognizable response envelope".to_string())
                }
            },
            Err(e) if e.is_transient() => AttemptOutcome::TransientFailure(e.to_string()),
            Err(e) => AttemptOutcome::PermanentFailure(e.to_string()),
        }
    }
}

/// Attempt and pacing parameters for the retry controller.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per batch.
    pub max_attempts: usize,
    /// Delay between attempts on the same batch.
    pub retry_delay: Duration,
    /// Pacing delay between consecutive batches, regardless of outcome.
    pub batch_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            batch_delay: Duration::from_secs(3),
        }
    }
}

/// Final outcome of a batch after retries.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// One result per item, in batch order.
    Completed(Vec<ItemResult>),
    /// All attempts failed; every item id goes to the failure set.
    Exhausted { ids: Vec<String>, error: String },
    /// Shutdown fired during a delay; the batch was abandoned for the next
    /// run's retry and must not be recorded.
    Interrupted,
}

/// Runs batches through the attempt/retry/pacing state machine.
pub struct RetryController {
    fetcher: Arc<dyn BatchFetcher>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
    batches_run: usize,
}

impl RetryController {
    pub fn new(
        fetcher: Arc<dyn BatchFetcher>,
        policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            policy,
            shutdown,
            batches_run: 0,
        }
    }

    /// Run one batch to a final outcome.
    ///
    /// Observes the inter-batch pacing delay before every batch after the
    /// first, then attempts up to `max_attempts` times with `retry_delay`
    /// between attempts.
    pub async fn run_batch(&mut self, batch: &Batch) -> BatchOutcome {
        if self.batches_run > 0 && self.pace(self.policy.batch_delay).await {
            return BatchOutcome::Interrupted;
        }
        self.batches_run += 1;

        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            match self.fetcher.attempt(batch).await {
                AttemptOutcome::Success(results) => {
                    debug!(batch = batch.index, attempt, "Batch completed");
                    return BatchOutcome::Completed(results);
                }
                AttemptOutcome::TransientFailure(reason) => {
                    warn!(
                        batch = batch.index,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %reason,
                        "Transient failure"
                    );
                    last_error = reason;
                    if attempt < self.policy.max_attempts
                        && self.pace(self.policy.retry_delay).await
                    {
                        return BatchOutcome::Interrupted;
                    }
                }
                AttemptOutcome::PermanentFailure(reason) => {
                    warn!(
                        batch = batch.index,
                        error = %reason,
                        "Permanent failure, not retrying"
                    );
                    return BatchOutcome::Exhausted {
                        ids: batch.ids(),
                        error: reason,
                    };
                }
            }
        }

        warn!(
            batch = batch.index,
            attempts = self.policy.max_attempts,
            "Batch exhausted retries"
        );
        BatchOutcome::Exhausted {
            ids: batch.ids(),
            error: last_error,
        }
    }

    /// Sleep for `delay`, racing the shutdown token.
    ///
    /// Returns true if shutdown fired before the delay elapsed.
    async fn pace(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }
}
