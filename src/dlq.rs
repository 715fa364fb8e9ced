//! Dead Letter Queue for items that exhausted retries.
//!
//! Records failed item ids to a per-run NDJSON file for later inspection and
//! offline resubmission. Records are buffered in memory and appended to the
//! file, so earlier flushes are never overwritten.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{DlqError, DlqSerializeSnafu, DlqWriteSnafu};

/// A record for one item that exhausted retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedItem {
    /// Id of the failed work item.
    pub id: String,
    /// Last error message before exhaustion.
    pub error: String,
    /// Batch the item belonged to.
    pub batch_index: usize,
    /// Timestamp when the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Dead Letter Queue writing failed items as NDJSON.
///
/// Each run creates a new file with a timestamp suffix.
pub struct DeadLetterQueue {
    path: PathBuf,
    buffer: Mutex<Vec<FailedItem>>,
    total: AtomicUsize,
    buffer_size: usize,
}

impl DeadLetterQueue {
    /// Create a DLQ writing to `{dir}/failures-{timestamp}.ndjson`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
        let path = dir.into().join(format!("failures-{timestamp}.ndjson"));

        info!(path = %path.display(), "DLQ enabled");

        Self {
            path,
            buffer: Mutex::new(Vec::new()),
            total: AtomicUsize::new(0),
            buffer_size: 100,
        }
    }

    /// The DLQ file path for this run.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record every id of an exhausted batch.
    pub async fn record_exhausted(
        &self,
        ids: &[String],
        error: &str,
        batch_index: usize,
    ) -> Result<(), DlqError> {
        let now = Utc::now();

        debug!(
            batch = batch_index,
            count = ids.len(),
            "Recording exhausted batch in DLQ"
        );

        let should_flush = {
            let mut buffer = self.buffer.lock().await;
            buffer.extend(ids.iter().map(|id| FailedItem {
                id: id.clone(),
                error: error.to_string(),
                batch_index,
                timestamp: now,
            }));
            buffer.len() >= self.buffer_size
        };
        self.total.fetch_add(ids.len(), Ordering::Relaxed);

        if should_flush {
            self.flush().await?;
        }
        Ok(())
    }

    /// Append buffered records to the DLQ file.
    pub async fn flush(&self) -> Result<(), DlqError> {
        let records = {
            let mut buffer = self.buffer.lock().await;
            if buffer.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut *buffer)
        };

        let mut ndjson = String::new();
        for record in &records {
            let line = serde_json::to_string(record).context(DlqSerializeSnafu)?;
            ndjson.push_str(&line);
            ndjson.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(DlqWriteSnafu)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context(DlqWriteSnafu)?;
        file.write_all(ndjson.as_bytes())
            .await
            .context(DlqWriteSnafu)?;
        file.flush().await.context(DlqWriteSnafu)?;

        debug!(count = records.len(), "Flushed DLQ records");
        Ok(())
    }

    /// Finalize the DLQ, flushing any remaining records.
    pub async fn finalize(&self) -> Result<(), DlqError> {
        self.flush().await?;
        let total = self.total.load(Ordering::Relaxed);
        if total > 0 {
            info!(
                total,
                path = %self.path.display(),
                "DLQ finalized"
            );
        }
        Ok(())
    }
}
