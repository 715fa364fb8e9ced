//! Accumulated pipeline state.
//!
//! Merges per-batch outcomes into the in-memory result set that the
//! checkpoint store persists. `processed_count` is always the length of a
//! prefix of the original work sequence, which is what makes resume-by-count
//! correct, and it never decreases across a resume.

use serde::{Deserialize, Serialize};

use crate::retry::BatchOutcome;
use crate::service::{ItemResult, ItemStatus};

fn default_schema_version() -> u32 {
    1
}

/// Durable snapshot of pipeline progress.
///
/// Every work item whose outcome (success, unparseable, not found, or
/// permanently failed) has been recorded counts toward `processed_count`;
/// only items never attempted remain unprocessed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulatedState {
    /// Schema version for forward compatibility.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Number of work items durably recorded, always a prefix of the source.
    #[serde(default)]
    pub processed_count: usize,
    /// Per-item results in work-source order.
    #[serde(default)]
    pub results: Vec<ItemResult>,
    /// Ids that exhausted retries, in the order their batches failed.
    #[serde(default)]
    pub failed_ids: Vec<String>,
    /// Unix timestamp of the last update.
    #[serde(default)]
    pub last_update_ts: i64,
}

impl Default for AccumulatedState {
    fn default() -> Self {
        Self {
            schema_version: 1,
            processed_count: 0,
            results: Vec::new(),
            failed_ids: Vec::new(),
            last_update_ts: 0,
        }
    }
}

/// Counts over the accumulated state, reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub unparseable: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl AccumulatedState {
    /// Merge one batch's final outcome.
    ///
    /// Appends results in batch order, routes exhausted ids to the failure
    /// set, and advances `processed_count` by the batch's item count. An
    /// interrupted batch was abandoned and is not recorded.
    pub fn record_batch(&mut self, item_count: usize, outcome: BatchOutcome) {
        match outcome {
            BatchOutcome::Completed(results) => self.results.extend(results),
            BatchOutcome::Exhausted { ids, .. } => self.failed_ids.extend(ids),
            BatchOutcome::Interrupted => return,
        }
        self.processed_count += item_count;
        self.last_update_ts = chrono::Utc::now().timestamp();
    }

    /// Per-bucket counts; every processed item lands in exactly one bucket.
    pub fn summary(&self) -> StateSummary {
        let mut summary = StateSummary {
            processed: self.processed_count,
            failed: self.failed_ids.len(),
            ..StateSummary::default()
        };
        for result in &self.results {
            match result.status {
                ItemStatus::Ok => summary.succeeded += 1,
                ItemStatus::Unparseable => summary.unparseable += 1,
                ItemStatus::NotFound => summary.not_found += 1,
            }
        }
        summary
    }
}
