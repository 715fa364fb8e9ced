//! Pipeline driver: orchestrates resume, batching, retries, and flushes.
//!
//! The driver owns the accumulated state for the duration of a run and moves
//! through `Initializing -> Resuming -> Running -> Flushing -> Completed`.
//! Retries and per-batch failures never abort the run; only configuration
//! validation, an unreadable work source, or a storage failure reach the
//! `Aborted` state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::accumulate::StateSummary;
use crate::batch::partition;
use crate::checkpoint::CheckpointManager;
use crate::dlq::DeadLetterQueue;
use crate::error::{ConfigError, PipelineError};
use crate::retry::{BatchFetcher, BatchOutcome, RetryController, RetryPolicy};
use crate::source::{WorkItem, WorkSource};

/// Driver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Initializing,
    Resuming,
    Running,
    Flushing,
    Completed,
    Aborted,
}

/// Pipeline tuning parameters.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Items per batch.
    pub batch_size: usize,
    /// Batches between checkpoint flushes.
    pub flush_interval_batches: usize,
    /// Retry and pacing parameters.
    pub policy: RetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            flush_interval_batches: 10,
            policy: RetryPolicy::default(),
        }
    }
}

impl PipelineOptions {
    /// Validate before any work starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.policy.max_attempts == 0 {
            return Err(ConfigError::ZeroMaxAttempts);
        }
        if self.flush_interval_batches == 0 {
            return Err(ConfigError::ZeroFlushInterval);
        }
        Ok(())
    }
}

/// Final counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub summary: StateSummary,
    /// True when the run stopped on a shutdown signal with work remaining.
    pub interrupted: bool,
}

/// Resumable batch pipeline.
pub struct Pipeline {
    source: Arc<dyn WorkSource>,
    fetcher: Arc<dyn BatchFetcher>,
    checkpoint: CheckpointManager,
    dlq: Option<DeadLetterQueue>,
    options: PipelineOptions,
    shutdown: CancellationToken,
    state: DriverState,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn WorkSource>,
        fetcher: Arc<dyn BatchFetcher>,
        checkpoint: CheckpointManager,
        dlq: Option<DeadLetterQueue>,
        options: PipelineOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            fetcher,
            checkpoint,
            dlq,
            options,
            shutdown,
            state: DriverState::Initializing,
        }
    }

    /// Current driver state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Run the pipeline to completion or interruption.
    ///
    /// Fatal errors (configuration, work source, storage) leave the driver
    /// in `Aborted`; everything else is recovered locally and reflected in
    /// the report.
    pub async fn run(&mut self) -> Result<PipelineReport, PipelineError> {
        match self.run_inner().await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.state = DriverState::Aborted;
                Err(e)
            }
        }
    }

    async fn run_inner(&mut self) -> Result<PipelineReport, PipelineError> {
        self.state = DriverState::Initializing;
        self.options.validate()?;

        self.state = DriverState::Resuming;
        let mut items = self.source.load().await?;
        let total = items.len();

        let loaded = self.checkpoint.load().await?;
        let done = self.checkpoint.state().processed_count;
        if done > total {
            warn!(
                processed = done,
                total, "Checkpoint is ahead of the work source"
            );
        }

        let remaining: Vec<WorkItem> = if done >= total {
            Vec::new()
        } else {
            items.split_off(done)
        };

        if loaded {
            info!(
                processed = done,
                remaining = remaining.len(),
                "Resuming from checkpoint"
            );
        } else {
            info!(total, "Cold start");
        }

        if remaining.is_empty() {
            return self.complete(false).await;
        }

        self.state = DriverState::Running;
        let first_index = done / self.options.batch_size;
        let batches = partition(remaining, self.options.batch_size, first_index)?;
        debug!(batches = batches.len(), "Partitioned remaining work");

        let mut controller = RetryController::new(
            self.fetcher.clone(),
            self.options.policy.clone(),
            self.shutdown.clone(),
        );

        let mut interrupted = false;
        let mut since_flush = 0usize;

        for batch in batches {
            if self.shutdown.is_cancelled() {
                interrupted = true;
                break;
            }

            let index = batch.index;
            let item_count = batch.items.len();
            let outcome = controller.run_batch(&batch).await;

            match &outcome {
                BatchOutcome::Interrupted => {
                    info!(
                        batch = index,
                        "Shutdown requested, abandoning batch for the next run"
                    );
                    interrupted = true;
                    break;
                }
                BatchOutcome::Exhausted { ids, error } => {
                    if let Some(dlq) = &self.dlq {
                        dlq.record_exhausted(ids, error, index).await?;
                    }
                }
                BatchOutcome::Completed(_) => {}
            }

            self.checkpoint.state_mut().record_batch(item_count, outcome);

            since_flush += 1;
            if since_flush >= self.options.flush_interval_batches {
                self.state = DriverState::Flushing;
                self.checkpoint.flush().await?;
                since_flush = 0;
                self.state = DriverState::Running;
            }
        }

        self.complete(interrupted).await
    }

    /// Final flush, failure-artifact finalization, and report.
    async fn complete(&mut self, interrupted: bool) -> Result<PipelineReport, PipelineError> {
        self.state = DriverState::Completed;
        self.checkpoint.flush().await?;
        if let Some(dlq) = &self.dlq {
            dlq.finalize().await?;
        }

        let summary = self.checkpoint.state().summary();
        info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            unparseable = summary.unparseable,
            not_found = summary.not_found,
            failed = summary.failed,
            interrupted,
            "Pipeline run finished"
        );

        Ok(PipelineReport {
            summary,
            interrupted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options = PipelineOptions::default();
        assert_eq!(options.batch_size, 50);
        assert_eq!(options.flush_interval_batches, 10);
        assert_eq!(options.policy.max_attempts, 3);
    }

    #[test]
    fn test_options_validation() {
        let mut options = PipelineOptions::default();
        options.batch_size = 0;
        assert!(matches!(
            options.validate(),
            Err(ConfigError::ZeroBatchSize)
        ));

        let mut options = PipelineOptions::default();
        options.policy.max_attempts = 0;
        assert!(matches!(
            options.validate(),
            Err(ConfigError::ZeroMaxAttempts)
        ));

        let mut options = PipelineOptions::default();
        options.flush_interval_batches = 0;
        assert!(matches!(
            options.validate(),
            Err(ConfigError::ZeroFlushInterval)
        ));
    }
}
