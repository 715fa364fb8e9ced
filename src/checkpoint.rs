//! Checkpoint persistence for accumulated pipeline state.
//!
//! Checkpoints are stored at `{output_dir}/{name}_checkpoint.json`.
//!
//! # Atomic Writes
//!
//! Checkpoint updates use the atomic write pattern:
//! 1. Write to a temp file: `{name}_checkpoint.json.tmp`
//! 2. Rename to the final path: `{name}_checkpoint.json`
//!
//! A crash mid-flush leaves at worst a stale temp file; the snapshot the next
//! `load()` reads is always the last completed flush.

use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::accumulate::AccumulatedState;
use crate::error::{
    CreateDirSnafu, ReadSnafu, ReplaceSnafu, SerializeSnafu, StorageError, WriteSnafu,
};

/// Filename suffix for checkpoint files.
pub const CHECKPOINT_SUFFIX: &str = "_checkpoint.json";

/// Write `bytes` to `path` atomically via a temp sibling and rename.
pub(crate) async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context(CreateDirSnafu {
                path: parent.display().to_string(),
            })?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await.context(WriteSnafu {
        path: tmp.display().to_string(),
    })?;
    tokio::fs::rename(&tmp, path).await.context(ReplaceSnafu {
        path: path.display().to_string(),
    })?;

    Ok(())
}

/// Manages checkpoint persistence for a pipeline run.
///
/// Owns the current [`AccumulatedState`] and serializes it to durable storage
/// with atomic write guarantees. Absence of a checkpoint is a valid initial
/// condition, not an error.
pub struct CheckpointManager {
    path: PathBuf,
    state: AccumulatedState,
}

impl CheckpointManager {
    /// Create a manager for `{output_dir}/{name}_checkpoint.json`.
    pub fn new(output_dir: impl Into<PathBuf>, name: &str) -> Self {
        let dir: PathBuf = output_dir.into();
        Self {
            path: dir.join(format!("{name}{CHECKPOINT_SUFFIX}")),
            state: AccumulatedState::default(),
        }
    }

    /// The checkpoint file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &AccumulatedState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AccumulatedState {
        &mut self.state
    }

    /// Load the last durable snapshot.
    ///
    /// Returns `Ok(true)` if a checkpoint was loaded, `Ok(false)` if none
    /// exists. Returns `Err` only for unexpected I/O errors (not "not found").
    pub async fn load(&mut self) -> Result<bool, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice::<AccumulatedState>(&bytes) {
                Ok(state) => {
                    info!(
                        path = %self.path.display(),
                        processed = state.processed_count,
                        failed = state.failed_ids.len(),
                        "Loaded checkpoint"
                    );
                    self.state = state;
                    Ok(true)
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Failed to parse checkpoint JSON, starting fresh"
                    );
                    self.state = AccumulatedState::default();
                    Ok(false)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No checkpoint found, starting fresh");
                Ok(false)
            }
            Err(source) => Err(StorageError::Read {
                path: self.path.display().to_string(),
                source,
            }),
        }
    }

    /// Durably write the current state.
    ///
    /// A `load()` in a new process after this call observes exactly this
    /// state; previously flushed results are never lost.
    pub async fn flush(&self) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(&self.state).context(SerializeSnafu)?;
        atomic_write(&self.path, &json).await?;

        debug!(
            path = %self.path.display(),
            processed = self.state.processed_count,
            "Saved checkpoint"
        );

        Ok(())
    }
}
